//! Waiting-duration buckets for open pull requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::database::models::{GovernanceState, GovernanceStateRow, Repository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WaitingBucket {
    #[serde(rename = "< 7 days")]
    UnderWeek,
    #[serde(rename = "7-30 days")]
    WeekToMonth,
    #[serde(rename = "30-90 days")]
    MonthToQuarter,
    #[serde(rename = "90+ days")]
    OverQuarter,
}

impl WaitingBucket {
    pub const ALL: [WaitingBucket; 4] = [
        WaitingBucket::UnderWeek,
        WaitingBucket::WeekToMonth,
        WaitingBucket::MonthToQuarter,
        WaitingBucket::OverQuarter,
    ];

    /// Lower bounds are inclusive: 7 days is `7-30 days`, 90 is `90+ days`.
    pub fn from_days(days: i64) -> Self {
        match days {
            d if d < 7 => WaitingBucket::UnderWeek,
            d if d < 30 => WaitingBucket::WeekToMonth,
            d if d < 90 => WaitingBucket::MonthToQuarter,
            _ => WaitingBucket::OverQuarter,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WaitingBucket::UnderWeek => "< 7 days",
            WaitingBucket::WeekToMonth => "7-30 days",
            WaitingBucket::MonthToQuarter => "30-90 days",
            WaitingBucket::OverQuarter => "90+ days",
        }
    }
}

/// Whole days elapsed, rounded down. A `since` in the future counts as 0.
pub fn waiting_days(since: DateTime<Utc>, as_of: DateTime<Utc>) -> i64 {
    (as_of - since).num_days().max(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingRow {
    pub repo: Repository,
    pub pr_number: i64,
    pub state: GovernanceState,
    pub waiting_days: i64,
    pub bucket: WaitingBucket,
}

/// Bucket each open pull request, longest waiting first.
pub fn bucket_waiting(rows: &[GovernanceStateRow], as_of: DateTime<Utc>) -> Vec<WaitingRow> {
    let mut bucketed: Vec<WaitingRow> = rows
        .iter()
        .map(|row| {
            let days = waiting_days(row.waiting_since, as_of);
            WaitingRow {
                repo: row.repo,
                pr_number: row.pr_number,
                state: row.state,
                waiting_days: days,
                bucket: WaitingBucket::from_days(days),
            }
        })
        .collect();
    bucketed.sort_by(|a, b| {
        b.waiting_days
            .cmp(&a.waiting_days)
            .then_with(|| (a.repo, a.pr_number).cmp(&(b.repo, b.pr_number)))
    });
    bucketed
}

/// Governance state x waiting bucket counts. Every state and bucket is
/// present so the grid is always complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingHeatmap {
    pub cells: BTreeMap<GovernanceState, BTreeMap<WaitingBucket, u64>>,
    pub total: u64,
}

impl WaitingHeatmap {
    pub fn count(&self, state: GovernanceState, bucket: WaitingBucket) -> u64 {
        self.cells
            .get(&state)
            .and_then(|row| row.get(&bucket))
            .copied()
            .unwrap_or(0)
    }
}

pub fn waiting_heatmap(rows: &[WaitingRow]) -> WaitingHeatmap {
    let mut cells: BTreeMap<GovernanceState, BTreeMap<WaitingBucket, u64>> = GovernanceState::ALL
        .into_iter()
        .map(|state| (state, WaitingBucket::ALL.into_iter().map(|b| (b, 0)).collect()))
        .collect();
    for row in rows {
        if let Some(count) = cells.get_mut(&row.state).and_then(|r| r.get_mut(&row.bucket)) {
            *count += 1;
        }
    }
    WaitingHeatmap {
        cells,
        total: rows.len() as u64,
    }
}
