//! Drift detection between event logs and their materialized caches.
//!
//! A mismatch is a sync bug in the producer, not a valid state. Nothing here
//! repairs the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{CompositionKey, EventLog, LogEvent};
use crate::database::models::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    ProposalStatus,
    UpgradeComposition,
    /// A stored event dated before an earlier-written event for the same key.
    OutOfOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyViolation {
    pub kind: DriftKind,
    pub entity: String,
    /// Value in the materialized table; for [`DriftKind::OutOfOrder`] the
    /// late event's timestamp.
    pub cached: Option<String>,
    /// Value obtained by replaying the log; for [`DriftKind::OutOfOrder`] the
    /// timestamp it went behind.
    pub replayed: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub checked: usize,
    pub violations: Vec<ConsistencyViolation>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn merge(mut self, other: ConsistencyReport) -> Self {
        self.checked += other.checked;
        self.violations.extend(other.violations);
        self
    }
}

/// Compare every snapshot status with the last `to_status` of its log.
pub fn check_snapshots(
    snapshots: &[ProposalSnapshot],
    log: &EventLog<StatusEvent>,
) -> ConsistencyReport {
    let replayed = log.replay(None);
    let cached: Vec<(ProposalKey, String)> = snapshots
        .iter()
        .map(|s| (s.key, s.status.clone()))
        .collect();

    compare(
        DriftKind::ProposalStatus,
        cached,
        replayed.iter().map(|(k, v)| (*k, v.clone())).collect(),
    )
}

/// Compare the current composition table with a replay of the composition log.
pub fn check_composition(
    current: &[UpgradeCompositionEntry],
    log: &EventLog<UpgradeCompositionEvent>,
) -> ConsistencyReport {
    let replayed = log.replay(None);
    let cached: Vec<(CompositionKey, String)> = current
        .iter()
        .map(|entry| {
            (
                CompositionKey {
                    upgrade_id: entry.upgrade_id,
                    proposal: entry.proposal,
                },
                entry.bucket.as_str().to_string(),
            )
        })
        .collect();

    compare(
        DriftKind::UpgradeComposition,
        cached,
        replayed
            .iter()
            .map(|(k, v)| (*k, v.as_str().to_string()))
            .collect(),
    )
}

/// Report events set aside by [`EventLog::from_written`]. They are left out
/// of the replay, so the other checks still run on the ordered remainder.
pub fn check_order<E: LogEvent>(rejected: &[(E, DateTime<Utc>)]) -> ConsistencyReport {
    let violations = rejected
        .iter()
        .map(|(event, latest)| ConsistencyViolation {
            kind: DriftKind::OutOfOrder,
            entity: event.key().to_string(),
            cached: Some(event.at().to_rfc3339()),
            replayed: Some(latest.to_rfc3339()),
        })
        .collect();
    ConsistencyReport {
        checked: 0,
        violations,
    }
}

fn compare<K>(kind: DriftKind, cached: Vec<(K, String)>, replayed: Vec<(K, String)>) -> ConsistencyReport
where
    K: Ord + Clone + std::fmt::Display,
{
    let cached: BTreeMap<K, String> = cached.into_iter().collect();
    let replayed: BTreeMap<K, String> = replayed.into_iter().collect();
    let keys: BTreeSet<&K> = cached.keys().chain(replayed.keys()).collect();

    let mut violations = Vec::new();
    for key in &keys {
        let left = cached.get(*key);
        let right = replayed.get(*key);
        if left != right {
            violations.push(ConsistencyViolation {
                kind,
                entity: key.to_string(),
                cached: left.cloned(),
                replayed: right.cloned(),
            });
        }
    }

    ConsistencyReport {
        checked: keys.len(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn key(number: i64) -> ProposalKey {
        ProposalKey::new(Repository::Ercs, number)
    }

    fn snapshot(number: i64, status: &str) -> ProposalSnapshot {
        ProposalSnapshot {
            key: key(number),
            status: status.to_string(),
            proposal_type: Some("Standards Track".into()),
            category: Some("ERC".into()),
            deadline: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    fn event(number: i64, to: &str, day: u32) -> StatusEvent {
        StatusEvent {
            key: key(number),
            from_status: None,
            to_status: to.to_string(),
            changed_at: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
            commit_sha: None,
            pr_number: None,
        }
    }

    #[test]
    fn test_matching_snapshot_is_consistent() {
        let log = EventLog::from_events(vec![event(20, "Draft", 1), event(20, "Final", 9)]).unwrap();
        let report = check_snapshots(&[snapshot(20, "Final")], &log);
        assert!(report.is_consistent());
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn test_stale_snapshot_is_reported() {
        let log = EventLog::from_events(vec![event(20, "Draft", 1), event(20, "Final", 9)]).unwrap();
        let report = check_snapshots(&[snapshot(20, "Draft"), snapshot(21, "Review")], &log);
        assert_eq!(report.violations.len(), 2);
        assert_eq!(report.violations[0].cached.as_deref(), Some("Draft"));
        assert_eq!(report.violations[0].replayed.as_deref(), Some("Final"));
        assert_eq!(report.violations[1].replayed, None);
    }

    #[test]
    fn test_late_events_are_reported_out_of_order() {
        let (log, rejected) = EventLog::from_written(vec![
            event(20, "Draft", 1),
            event(20, "Final", 9),
            event(20, "Withdrawn", 4),
        ]);
        let report = check_snapshots(&[snapshot(20, "Final")], &log).merge(check_order(&rejected));
        assert_eq!(report.checked, 1);
        assert_eq!(report.violations.len(), 1);
        let violation = &report.violations[0];
        assert_eq!(violation.kind, DriftKind::OutOfOrder);
        assert_eq!(violation.entity, key(20).to_string());
        assert_eq!(violation.cached.as_deref(), Some("2024-03-04T00:00:00+00:00"));
        assert_eq!(violation.replayed.as_deref(), Some("2024-03-09T00:00:00+00:00"));
    }
}
