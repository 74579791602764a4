//! Dense calendar-month time series.
//!
//! Every month of the requested range is present, with zero counts for
//! months without events, so series line up positionally.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::database::models::*;
use crate::error::InsightsError;

/// UTC calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, InsightsError> {
        if !(1..=12).contains(&month) {
            return Err(InsightsError::ValidationError(format!("Invalid month: {}", month)));
        }
        Ok(Self { year, month })
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// The month `n` months before this one.
    pub fn minus(self, n: u32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) - n as i32;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// First instant of the month.
    pub fn start(self) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// First instant of the following month.
    pub fn end(self) -> DateTime<Utc> {
        self.next().start()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Inclusive range of months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthRange {
    pub first: MonthKey,
    pub last: MonthKey,
}

impl MonthRange {
    pub fn new(first: MonthKey, last: MonthKey) -> Result<Self, InsightsError> {
        if first > last {
            return Err(InsightsError::ValidationError(format!(
                "Month range starts after it ends: {} > {}",
                first, last
            )));
        }
        Ok(Self { first, last })
    }

    /// The `count` months ending with the month containing `as_of`.
    pub fn trailing(as_of: DateTime<Utc>, count: u32) -> Result<Self, InsightsError> {
        if count == 0 {
            return Err(InsightsError::invalid_filter("months", count, "expected at least one month"));
        }
        let last = MonthKey::of(as_of);
        Ok(Self {
            first: last.minus(count - 1),
            last,
        })
    }

    pub fn months(&self) -> Vec<MonthKey> {
        let mut months = Vec::new();
        let mut current = self.first;
        while current <= self.last {
            months.push(current);
            current = current.next();
        }
        months
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let month = MonthKey::of(at);
        month >= self.first && month <= self.last
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.first.start()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.last.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthPoint {
    pub month: String,
    pub count: u64,
}

/// Count timestamps per month over `range`, filling empty months with zero.
pub fn dense_monthly_counts(
    timestamps: impl IntoIterator<Item = DateTime<Utc>>,
    range: &MonthRange,
) -> Vec<MonthPoint> {
    let mut counts: BTreeMap<MonthKey, u64> = range.months().into_iter().map(|m| (m, 0)).collect();
    for at in timestamps {
        if let Some(count) = counts.get_mut(&MonthKey::of(at)) {
            *count += 1;
        }
    }
    counts
        .into_iter()
        .map(|(month, count)| MonthPoint {
            month: month.to_string(),
            count,
        })
        .collect()
}

/// Status-change momentum: status events per month.
pub fn momentum(events: &[StatusEvent], range: &MonthRange) -> Vec<MonthPoint> {
    dense_monthly_counts(events.iter().map(|e| e.changed_at), range)
}

/// Pull requests opened, merged and closed-unmerged per month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputPoint {
    pub month: String,
    pub opened: u64,
    pub merged: u64,
    pub closed: u64,
}

pub fn monthly_throughput(prs: &[PullRequest], range: &MonthRange) -> Vec<ThroughputPoint> {
    let opened = dense_monthly_counts(prs.iter().map(|pr| pr.created_at), range);
    let merged = dense_monthly_counts(prs.iter().filter_map(|pr| pr.merged_at), range);
    let closed = dense_monthly_counts(
        prs.iter()
            .filter(|pr| pr.merged_at.is_none())
            .filter_map(|pr| pr.closed_at),
        range,
    );

    opened
        .into_iter()
        .zip(merged)
        .zip(closed)
        .map(|((o, m), c)| ThroughputPoint {
            month: o.month,
            opened: o.count,
            merged: m.count,
            closed: c.count,
        })
        .collect()
}

/// Contributor actions per month, split by action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPoint {
    pub month: String,
    pub total: u64,
    pub by_action: BTreeMap<ActivityAction, u64>,
}

pub fn activity_timeline(activity: &[ContributorActivity], range: &MonthRange) -> Vec<ActivityPoint> {
    let mut buckets: BTreeMap<MonthKey, BTreeMap<ActivityAction, u64>> =
        range.months().into_iter().map(|m| (m, BTreeMap::new())).collect();
    for item in activity {
        if let Some(actions) = buckets.get_mut(&MonthKey::of(item.occurred_at)) {
            *actions.entry(item.action).or_insert(0) += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(month, by_action)| ActivityPoint {
            month: month.to_string(),
            total: by_action.values().sum(),
            by_action,
        })
        .collect()
}
