//! Filter surface accepted by the aggregation entry points.
//!
//! Raw string inputs are validated here, before any query is issued.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::database::models::Repository;
use crate::database::predicate::Predicate;
use crate::error::InsightsError;

/// Half-open event-time window `[from, to)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<Self, InsightsError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(InsightsError::invalid_filter(
                    "from",
                    from.to_rfc3339(),
                    "window start is after its end",
                ));
            }
        }
        Ok(Self { from, to })
    }

    /// The `days` days leading up to `as_of`.
    pub fn trailing_days(as_of: DateTime<Utc>, days: i64) -> Self {
        Self {
            from: Some(as_of - Duration::days(days)),
            to: Some(as_of),
        }
    }

    /// Parse ISO date bounds. A date-only `to` covers that whole day.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, InsightsError> {
        let from = from.map(|raw| parse_bound("from", raw, false)).transpose()?;
        let to = to.map(|raw| parse_bound("to", raw, true)).transpose()?;
        Self::new(from, to)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }

    pub fn predicate(&self, column: &'static str) -> Predicate {
        Predicate::window(column, self.from, self.to)
    }
}

/// Reference instant for "now"-relative views. A bare date means its
/// midnight (UTC).
pub fn parse_as_of(raw: &str) -> Result<DateTime<Utc>, InsightsError> {
    parse_bound("asOf", raw, false)
}

fn parse_bound(field: &str, raw: &str, end_of_range: bool) -> Result<DateTime<Utc>, InsightsError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        InsightsError::invalid_filter(field, raw, "expected YYYY-MM-DD or an RFC 3339 timestamp")
    })?;
    let date = if end_of_range {
        date.succ_opt()
            .ok_or_else(|| InsightsError::invalid_filter(field, raw, "date out of range"))?
    } else {
        date
    };
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| InsightsError::invalid_filter(field, raw, "date out of range"))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDir {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            _ => Err(InsightsError::invalid_filter("sortDir", s, "expected asc or desc")),
        }
    }
}

/// Unvalidated filter values as they arrive from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFilter {
    pub repo: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

/// Validated filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilter {
    pub repo: Option<Repository>,
    pub window: DateWindow,
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_dir: SortDir,
}

impl ViewFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_repo(repo: Repository) -> Self {
        Self {
            repo: Some(repo),
            ..Self::default()
        }
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, sort_by: &str, sort_dir: SortDir) -> Self {
        self.sort_by = Some(sort_by.to_string());
        self.sort_dir = sort_dir;
        self
    }

    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }

    pub fn matches_repo(&self, repo: Repository) -> bool {
        self.repo.map_or(true, |wanted| wanted == repo)
    }

    /// Parse `sort_by` into the view's column set; `None` when absent.
    pub fn sort_column<T>(&self) -> Result<Option<T>, InsightsError>
    where
        T: FromStr<Err = InsightsError>,
    {
        self.sort_by.as_deref().map(str::parse::<T>).transpose()
    }

    /// For views with a fixed row order: any `sort_by` is rejected.
    pub fn ensure_unsorted(&self, view: &str) -> Result<(), InsightsError> {
        match self.sort_by.as_deref() {
            Some(column) => Err(InsightsError::invalid_filter(
                "sortBy",
                column,
                format!("{} has no sortable columns", view),
            )),
            None => Ok(()),
        }
    }
}

impl TryFrom<RawFilter> for ViewFilter {
    type Error = InsightsError;

    fn try_from(raw: RawFilter) -> Result<Self, Self::Error> {
        let repo = match raw.repo.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(value) => Some(value.parse::<Repository>()?),
        };
        let window = DateWindow::parse(raw.from.as_deref(), raw.to.as_deref())?;
        let limit = raw.limit.as_deref().map(parse_limit).transpose()?;
        let sort_dir = raw
            .sort_dir
            .as_deref()
            .map(str::parse::<SortDir>)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            repo,
            window,
            limit,
            sort_by: raw.sort_by,
            sort_dir,
        })
    }
}

fn parse_limit(raw: &str) -> Result<usize, InsightsError> {
    match raw.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(InsightsError::invalid_filter("limit", raw, "expected a positive integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(repo: Option<&str>) -> RawFilter {
        RawFilter {
            repo: repo.map(String::from),
            ..RawFilter::default()
        }
    }

    #[test]
    fn test_unknown_repo_is_rejected() {
        let err = ViewFilter::try_from(raw(Some("bips"))).unwrap_err();
        assert!(matches!(err, InsightsError::InvalidFilter { ref field, .. } if field == "repo"));
    }

    #[test]
    fn test_absent_repo_means_all() {
        let filter = ViewFilter::try_from(raw(None)).unwrap();
        assert_eq!(filter.repo, None);
        assert!(filter.matches_repo(Repository::Rips));
    }

    #[test]
    fn test_date_only_to_covers_the_whole_day() {
        let window = DateWindow::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        let last_minute = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert!(window.contains(last_minute));
        assert!(!window.contains(next_day));
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        assert!(DateWindow::parse(Some("2024-03-01"), Some("2024-01-01")).is_err());
        assert!(DateWindow::parse(Some("yesterday"), None).is_err());
    }

    #[test]
    fn test_limit_must_be_positive() {
        let mut filter = raw(None);
        filter.limit = Some("0".into());
        assert!(ViewFilter::try_from(filter.clone()).is_err());
        filter.limit = Some("25".into());
        assert_eq!(ViewFilter::try_from(filter).unwrap().limit, Some(25));
    }

    #[test]
    fn test_sort_dir_parsing() {
        let mut filter = raw(None);
        filter.sort_dir = Some("ASC".into());
        assert_eq!(ViewFilter::try_from(filter.clone()).unwrap().sort_dir, SortDir::Asc);
        filter.sort_dir = Some("sideways".into());
        assert!(ViewFilter::try_from(filter).is_err());
    }

    #[test]
    fn test_sort_by_on_fixed_order_view_is_rejected() {
        let filter = ViewFilter::all().with_sort("score", SortDir::Asc);
        let err = filter.ensure_unsorted("funnel").unwrap_err();
        assert!(matches!(err, InsightsError::InvalidFilter { ref field, .. } if field == "sortBy"));
        assert!(ViewFilter::all().ensure_unsorted("funnel").is_ok());
    }

    #[test]
    fn test_as_of_accepts_dates_and_timestamps() {
        assert_eq!(
            parse_as_of("2024-06-30").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_as_of("2024-06-30T12:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 30, 10, 0, 0).unwrap()
        );
        assert!(matches!(parse_as_of("now"), Err(InsightsError::InvalidFilter { .. })));
    }
}
