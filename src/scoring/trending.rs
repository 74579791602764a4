//! Trending proposals over a trailing window.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::database::models::*;
use crate::filters::DateWindow;

pub const PR_EVENT_WEIGHT: u64 = 2;
pub const COMMENT_WEIGHT: u64 = 1;
pub const STATUS_CHANGE_BONUS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingRow {
    pub key: ProposalKey,
    pub title: Option<String>,
    pub recent_pr_events: u64,
    pub comment_count: u64,
    pub status_changed: bool,
    pub score: u64,
}

impl TrendingRow {
    fn new(key: ProposalKey) -> Self {
        Self {
            key,
            title: None,
            recent_pr_events: 0,
            comment_count: 0,
            status_changed: false,
            score: 0,
        }
    }
}

/// Score proposals by activity on their linked pull requests inside
/// `window`.
///
/// `score = 2 * pr_events + comments + (10 if the status changed)`. Comments
/// count once; every other action is a PR event. Zero scores are dropped and
/// ties are ordered by `(repo, number)`.
pub fn trending_scores(
    links: &[PullRequestLink],
    activity: &[ContributorActivity],
    status_events: &[StatusEvent],
    window: &DateWindow,
    limit: usize,
) -> Vec<TrendingRow> {
    let mut linked: BTreeMap<(Repository, i64), Vec<ProposalKey>> = BTreeMap::new();
    for link in links {
        linked
            .entry((link.pr_repo, link.pr_number))
            .or_default()
            .push(link.proposal);
    }

    let mut rows: BTreeMap<ProposalKey, TrendingRow> = BTreeMap::new();
    for item in activity.iter().filter(|a| window.contains(a.occurred_at)) {
        let Some(pr_number) = item.pr_number else { continue };
        let Some(proposals) = linked.get(&(item.repo, pr_number)) else { continue };
        let distinct: BTreeSet<&ProposalKey> = proposals.iter().collect();
        for key in distinct {
            let row = rows.entry(*key).or_insert_with(|| TrendingRow::new(*key));
            match item.action {
                ActivityAction::Commented => row.comment_count += 1,
                _ => row.recent_pr_events += 1,
            }
        }
    }
    for event in status_events.iter().filter(|e| window.contains(e.changed_at)) {
        rows.entry(event.key)
            .or_insert_with(|| TrendingRow::new(event.key))
            .status_changed = true;
    }

    let mut scored: Vec<TrendingRow> = rows
        .into_values()
        .map(|mut row| {
            row.score = row.recent_pr_events * PR_EVENT_WEIGHT
                + row.comment_count * COMMENT_WEIGHT
                + if row.status_changed { STATUS_CHANGE_BONUS } else { 0 };
            row
        })
        .filter(|row| row.score > 0)
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()
    }

    fn link(pr: i64, number: i64) -> PullRequestLink {
        PullRequestLink {
            pr_repo: Repository::Eips,
            pr_number: pr,
            proposal: ProposalKey::new(Repository::Eips, number),
        }
    }

    fn activity(pr: i64, action: ActivityAction, days_ago: i64) -> ContributorActivity {
        ContributorActivity {
            repo: Repository::Eips,
            actor: "editor".into(),
            role: ContributorRole::Editor,
            action,
            pr_number: Some(pr),
            occurred_at: as_of() - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_score_formula() {
        let window = DateWindow::trailing_days(as_of(), 7);
        let links = vec![link(10, 100), link(11, 200)];
        let items = vec![
            activity(10, ActivityAction::Reviewed, 1),
            activity(10, ActivityAction::Committed, 2),
            activity(10, ActivityAction::Commented, 3),
            activity(11, ActivityAction::Commented, 1),
        ];
        let events = vec![StatusEvent {
            key: ProposalKey::new(Repository::Eips, 200),
            from_status: Some("Review".into()),
            to_status: "Last Call".into(),
            changed_at: as_of() - Duration::days(2),
            commit_sha: None,
            pr_number: Some(11),
        }];

        let rows = trending_scores(&links, &items, &events, &window, 20);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key.number, 200);
        assert_eq!(rows[0].score, 11);
        assert_eq!(rows[1].score, 5);
    }

    #[test]
    fn test_zero_scores_and_stale_activity_are_excluded() {
        let window = DateWindow::trailing_days(as_of(), 7);
        let links = vec![link(10, 100), link(12, 300)];
        let items = vec![activity(10, ActivityAction::Reviewed, 30), activity(99, ActivityAction::Reviewed, 1)];
        let rows = trending_scores(&links, &items, &[], &window, 20);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_ties_are_ordered_by_key() {
        let window = DateWindow::trailing_days(as_of(), 7);
        let links = vec![link(1, 30), link(2, 20), link(3, 10)];
        let items = vec![
            activity(1, ActivityAction::Opened, 1),
            activity(2, ActivityAction::Opened, 1),
            activity(3, ActivityAction::Opened, 1),
        ];
        let rows = trending_scores(&links, &items, &[], &window, 2);
        let numbers: Vec<i64> = rows.iter().map(|r| r.key.number).collect();
        assert_eq!(numbers, vec![10, 20]);
    }
}
