//! Current status counts with a month-over-month delta.
//!
//! `previous_count = current_count - arrivals_this_month`, where arrivals are
//! status events whose `to_status` is the status and whose time falls in the
//! month. Proposals that *left* a status during the month are not added
//! back, so `previous_count` undercounts for statuses with outflow and may go
//! negative. Dashboards depend on this exact figure; keep it as is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::trend::MonthKey;
use crate::database::models::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshotRow {
    pub status: String,
    pub repo: Repository,
    pub current_count: i64,
    pub arrivals_this_month: i64,
    pub previous_count: i64,
    pub delta: i64,
}

/// One row per `(status, repo)` present in the snapshots, in canonical
/// status order then repository order. Spelling variants share a row, as in
/// the funnel.
pub fn status_snapshot(
    snapshots: &[ProposalSnapshot],
    events: &[StatusEvent],
    month: MonthKey,
) -> Vec<StatusSnapshotRow> {
    let mut current: BTreeMap<(usize, &'static str, Repository), i64> = BTreeMap::new();
    for snapshot in snapshots {
        let key = (
            ProposalStatus::rank_of(&snapshot.status),
            ProposalStatus::bucket_label(&snapshot.status),
            snapshot.key.repo,
        );
        *current.entry(key).or_insert(0) += 1;
    }

    let (start, end) = (month.start(), month.end());
    let mut arrivals: BTreeMap<(&'static str, Repository), i64> = BTreeMap::new();
    for event in events.iter().filter(|e| e.changed_at >= start && e.changed_at < end) {
        *arrivals
            .entry((ProposalStatus::bucket_label(&event.to_status), event.key.repo))
            .or_insert(0) += 1;
    }

    current
        .into_iter()
        .map(|((_, status, repo), current_count)| {
            let arrivals_this_month = arrivals.get(&(status, repo)).copied().unwrap_or(0);
            let previous_count = current_count - arrivals_this_month;
            StatusSnapshotRow {
                status: status.to_string(),
                repo,
                current_count,
                arrivals_this_month,
                previous_count,
                delta: current_count - previous_count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
    }

    fn snapshot(repo: Repository, number: i64, status: &str) -> ProposalSnapshot {
        ProposalSnapshot {
            key: ProposalKey::new(repo, number),
            status: status.into(),
            proposal_type: None,
            category: None,
            deadline: None,
            updated_at: at(3, 1),
        }
    }

    fn arrival(repo: Repository, number: i64, from: &str, to: &str, changed_at: DateTime<Utc>) -> StatusEvent {
        StatusEvent {
            key: ProposalKey::new(repo, number),
            from_status: Some(from.into()),
            to_status: to.into(),
            changed_at,
            commit_sha: None,
            pr_number: None,
        }
    }

    #[test]
    fn test_previous_count_subtracts_arrivals_in_month() {
        let snapshots = vec![
            snapshot(Repository::Eips, 1, "Final"),
            snapshot(Repository::Eips, 2, "Final"),
            snapshot(Repository::Eips, 3, "Final"),
            snapshot(Repository::Eips, 4, "Draft"),
            snapshot(Repository::Ercs, 5, "Final"),
        ];
        let events = vec![
            arrival(Repository::Eips, 1, "Last Call", "Final", at(3, 4)),
            arrival(Repository::Eips, 2, "Last Call", "Final", at(3, 30)),
            // Previous month: not an arrival for March.
            arrival(Repository::Eips, 3, "Last Call", "Final", at(2, 28)),
        ];

        let rows = status_snapshot(&snapshots, &events, MonthKey::new(2024, 3).unwrap());
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].status, "Draft");
        assert_eq!(rows[0].delta, 0);

        let eips_final = &rows[1];
        assert_eq!((eips_final.status.as_str(), eips_final.repo), ("Final", Repository::Eips));
        assert_eq!(eips_final.current_count, 3);
        assert_eq!(eips_final.previous_count, 1);
        assert_eq!(eips_final.delta, 2);

        assert_eq!(rows[2].repo, Repository::Ercs);
        assert_eq!(rows[2].previous_count, 1);
    }

    #[test]
    fn test_status_variants_share_a_row() {
        let snapshots = vec![
            snapshot(Repository::Eips, 1, "Last Call"),
            snapshot(Repository::Eips, 2, "LastCall"),
        ];
        let events = vec![arrival(Repository::Eips, 2, "Review", "last-call", at(3, 12))];

        let rows = status_snapshot(&snapshots, &events, MonthKey::new(2024, 3).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "Last Call");
        assert_eq!(rows[0].current_count, 2);
        assert_eq!(rows[0].arrivals_this_month, 1);
        assert_eq!(rows[0].previous_count, 1);
    }

    #[test]
    fn test_departures_are_not_compensated() {
        let snapshots = vec![snapshot(Repository::Eips, 9, "Final")];
        let events = vec![
            arrival(Repository::Eips, 8, "Draft", "Review", at(5, 2)),
            arrival(Repository::Eips, 9, "Review", "Final", at(5, 20)),
        ];
        let rows = status_snapshot(&snapshots, &events, MonthKey::new(2024, 5).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].previous_count, 0);

        // #11 entered Review and moved on within the month. Its arrival is
        // still subtracted, so previous_count goes negative.
        let review_snapshot = vec![snapshot(Repository::Eips, 10, "Review")];
        let events = vec![
            arrival(Repository::Eips, 10, "Draft", "Review", at(5, 2)),
            arrival(Repository::Eips, 11, "Draft", "Review", at(5, 3)),
        ];
        let rows = status_snapshot(&review_snapshot, &events, MonthKey::new(2024, 5).unwrap());
        assert_eq!(rows[0].previous_count, -1);
    }
}
