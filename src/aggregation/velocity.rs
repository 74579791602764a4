//! Duration metrics: decision velocity, time to decision, response time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::percentile::{days_between, DurationSummary};
use crate::database::models::*;
use crate::filters::DateWindow;

/// A `(from_status, to_status)` pair whose elapsed time is measured.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionPair {
    pub from: String,
    pub to: String,
}

impl TransitionPair {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Draft->Review, Review->Last Call, Last Call->Final, Draft->Final.
    pub fn defaults() -> Vec<TransitionPair> {
        vec![
            TransitionPair::new("Draft", "Review"),
            TransitionPair::new("Review", "Last Call"),
            TransitionPair::new("Last Call", "Final"),
            TransitionPair::new("Draft", "Final"),
        ]
    }
}

/// Everything needed to pair transitions for one proposal.
#[derive(Debug, Clone)]
pub struct ProposalHistory<'a> {
    pub key: ProposalKey,
    pub created_at: Option<DateTime<Utc>>,
    /// Status events of this proposal, oldest first.
    pub events: Vec<&'a StatusEvent>,
}

/// Group events per proposal, attaching creation times where known.
pub fn histories<'a>(
    events: &'a [StatusEvent],
    proposals: &[Proposal],
) -> Vec<ProposalHistory<'a>> {
    let created: BTreeMap<ProposalKey, DateTime<Utc>> =
        proposals.iter().map(|p| (p.key, p.created_at)).collect();
    let mut grouped: BTreeMap<ProposalKey, Vec<&'a StatusEvent>> = BTreeMap::new();
    for event in events {
        grouped.entry(event.key).or_default().push(event);
    }
    grouped
        .into_iter()
        .map(|(key, mut events)| {
            events.sort_by_key(|e| e.changed_at);
            ProposalHistory {
                key,
                created_at: created.get(&key).copied(),
                events,
            }
        })
        .collect()
}

fn same_status(a: &str, b: &str) -> bool {
    match (ProposalStatus::from_label(a), ProposalStatus::from_label(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// Start and end instants of `pair` for one proposal.
///
/// The start is the earliest transition into `from`; when the history never
/// enters `from`, the proposal's creation time stands in. The end is the
/// first transition into `to` at or after the start.
pub fn transition_span(
    history: &ProposalHistory<'_>,
    pair: &TransitionPair,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = history
        .events
        .iter()
        .find(|e| same_status(&e.to_status, &pair.from))
        .map(|e| e.changed_at)
        .or(history.created_at)?;

    let end = history
        .events
        .iter()
        .find(|e| same_status(&e.to_status, &pair.to) && e.changed_at >= start)?
        .changed_at;

    Some((start, end))
}

/// Days from entering `pair.from` to entering `pair.to` for one proposal.
pub fn transition_days(history: &ProposalHistory<'_>, pair: &TransitionPair) -> Option<f64> {
    transition_span(history, pair).map(|(start, end)| days_between(start, end))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityRow {
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub summary: DurationSummary,
}

/// Median (and spread) of transition durations per requested pair.
///
/// Histories must be complete: pairing runs over every event, and `window`
/// then keeps the transitions that completed inside it.
pub fn decision_velocity(
    histories: &[ProposalHistory<'_>],
    pairs: &[TransitionPair],
    window: &DateWindow,
) -> Vec<VelocityRow> {
    pairs
        .iter()
        .map(|pair| {
            let days: Vec<f64> = histories
                .iter()
                .filter_map(|h| transition_span(h, pair))
                .filter(|(_, end)| window.contains(*end))
                .map(|(start, end)| days_between(start, end))
                .collect();
            VelocityRow {
                from: pair.from.clone(),
                to: pair.to.clone(),
                summary: DurationSummary::from_days(&days),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Merged,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRow {
    pub outcome: Outcome,
    #[serde(flatten)]
    pub summary: DurationSummary,
}

/// Days from opening to merge, or to close for unmerged pull requests.
pub fn time_to_decision(prs: &[PullRequest]) -> Vec<OutcomeRow> {
    let mut merged = Vec::new();
    let mut closed = Vec::new();
    for pr in prs {
        if let Some(merged_at) = pr.merged_at {
            merged.push(days_between(pr.created_at, merged_at).max(0.0));
        } else if let Some(closed_at) = pr.closed_at {
            closed.push(days_between(pr.created_at, closed_at).max(0.0));
        }
    }
    vec![
        OutcomeRow {
            outcome: Outcome::Merged,
            summary: DurationSummary::from_days(&merged),
        },
        OutcomeRow {
            outcome: Outcome::Closed,
            summary: DurationSummary::from_days(&closed),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSummary {
    pub repo: Option<Repository>,
    pub awaiting_response: usize,
    #[serde(flatten)]
    pub summary: DurationSummary,
}

/// Days until the first review or comment by someone other than the author.
pub fn median_response_days(
    prs: &[PullRequest],
    activity: &[ContributorActivity],
    repo: Option<Repository>,
) -> ResponseSummary {
    let mut first_response: BTreeMap<(Repository, i64), DateTime<Utc>> = BTreeMap::new();
    let authors: BTreeMap<(Repository, i64), (&str, DateTime<Utc>)> = prs
        .iter()
        .map(|pr| ((pr.repo, pr.number), (pr.author.as_str(), pr.created_at)))
        .collect();

    for item in activity {
        if !matches!(item.action, ActivityAction::Reviewed | ActivityAction::Commented) {
            continue;
        }
        let Some(pr_number) = item.pr_number else { continue };
        let key = (item.repo, pr_number);
        let Some((author, created_at)) = authors.get(&key) else { continue };
        if item.actor.eq_ignore_ascii_case(author) || item.occurred_at < *created_at {
            continue;
        }
        first_response
            .entry(key)
            .and_modify(|at| *at = (*at).min(item.occurred_at))
            .or_insert(item.occurred_at);
    }

    let days: Vec<f64> = first_response
        .iter()
        .filter_map(|(key, at)| authors.get(key).map(|(_, created)| days_between(*created, *at)))
        .collect();

    ResponseSummary {
        repo,
        awaiting_response: prs.len() - days.len(),
        summary: DurationSummary::from_days(&days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn event(number: i64, from: Option<&str>, to: &str, changed_at: DateTime<Utc>) -> StatusEvent {
        StatusEvent {
            key: ProposalKey::new(Repository::Eips, number),
            from_status: from.map(String::from),
            to_status: to.into(),
            changed_at,
            commit_sha: None,
            pr_number: None,
        }
    }

    fn proposal(number: i64, created_at: DateTime<Utc>) -> Proposal {
        Proposal {
            key: ProposalKey::new(Repository::Eips, number),
            title: format!("EIP-{}", number),
            authors: vec!["alice".into()],
            created_at,
            requires: vec![],
        }
    }

    #[test]
    fn test_single_sample_median_is_the_elapsed_days() {
        let events = vec![
            event(100, None, "Draft", at(2024, 1, 1)),
            event(100, Some("Draft"), "Review", at(2024, 2, 1)),
            event(100, Some("Review"), "Final", at(2024, 4, 1)),
        ];
        let hs = histories(&events, &[]);
        let rows = decision_velocity(&hs, &[TransitionPair::new("Draft", "Final")], &DateWindow::unbounded());
        // 2024 is a leap year: 31 + 29 + 31 days.
        assert_eq!(rows[0].summary.median_days, Some(91.0));
        assert_eq!(rows[0].summary.sample_size, 1);
    }

    #[test]
    fn test_window_keeps_pairs_that_complete_inside_it() {
        let events = vec![
            event(100, None, "Draft", at(2024, 1, 1)),
            event(100, Some("Draft"), "Review", at(2024, 2, 1)),
            event(100, Some("Review"), "Final", at(2024, 4, 1)),
        ];
        let hs = histories(&events, &[]);
        let window = DateWindow::new(Some(at(2024, 3, 1)), None).unwrap();
        let pairs = [TransitionPair::new("Review", "Final"), TransitionPair::new("Draft", "Review")];

        let rows = decision_velocity(&hs, &pairs, &window);
        assert_eq!(rows[0].summary.median_days, Some(60.0));
        // Draft -> Review completed before the window opened.
        assert_eq!(rows[1].summary.sample_size, 0);
    }

    #[test]
    fn test_creation_time_stands_in_for_missing_from_state() {
        let events = vec![event(7, None, "Review", at(2023, 3, 11))];
        let proposals = vec![proposal(7, at(2023, 3, 1))];
        let hs = histories(&events, &proposals);
        assert_eq!(transition_days(&hs[0], &TransitionPair::new("Draft", "Review")), Some(10.0));

        let without_creation = histories(&events, &[]);
        assert_eq!(
            transition_days(&without_creation[0], &TransitionPair::new("Draft", "Review")),
            None
        );
    }

    #[test]
    fn test_pairing_uses_earliest_entry_into_from_state() {
        // Draft, Stagnant, back to Draft, then Review: measured from the first Draft.
        let events = vec![
            event(9, None, "Draft", at(2023, 1, 1)),
            event(9, Some("Draft"), "Stagnant", at(2023, 7, 1)),
            event(9, Some("Stagnant"), "Draft", at(2023, 8, 1)),
            event(9, Some("Draft"), "Review", at(2023, 8, 11)),
        ];
        let hs = histories(&events, &[]);
        let days = transition_days(&hs[0], &TransitionPair::new("Draft", "Review")).unwrap();
        assert_eq!(days, 222.0);
    }

    #[test]
    fn test_median_never_exceeds_the_longest_sample() {
        let events = vec![
            event(1, None, "Draft", at(2023, 1, 1)),
            event(1, Some("Draft"), "Final", at(2023, 1, 11)),
            event(2, None, "Draft", at(2023, 1, 1)),
            event(2, Some("Draft"), "Final", at(2023, 3, 2)),
            event(3, None, "Draft", at(2023, 1, 1)),
            event(3, Some("Draft"), "Final", at(2023, 1, 31)),
        ];
        let hs = histories(&events, &[]);
        let row = &decision_velocity(&hs, &[TransitionPair::new("Draft", "Final")], &DateWindow::unbounded())[0];
        let median = row.summary.median_days.unwrap();
        assert_eq!(median, 30.0);
        assert!(median >= 0.0 && median <= row.summary.max_days.unwrap());
    }

    fn pr(number: i64, created: DateTime<Utc>, merged: Option<DateTime<Utc>>, closed: Option<DateTime<Utc>>) -> PullRequest {
        PullRequest {
            repo: Repository::Eips,
            number,
            title: "Update EIP-7702".into(),
            author: "author".into(),
            state: if closed.is_some() { PrState::Closed } else { PrState::Open },
            created_at: created,
            merged_at: merged,
            closed_at: closed,
            comment_count: 0,
            review_count: 0,
            commit_count: 1,
            file_count: 1,
            labels: vec![],
        }
    }

    #[test]
    fn test_time_to_decision_splits_by_outcome() {
        let prs = vec![
            pr(1, at(2024, 1, 1), Some(at(2024, 1, 3)), Some(at(2024, 1, 3))),
            pr(2, at(2024, 1, 1), Some(at(2024, 1, 5)), Some(at(2024, 1, 5))),
            pr(3, at(2024, 1, 1), None, Some(at(2024, 1, 21))),
            pr(4, at(2024, 1, 1), None, None),
        ];
        let rows = time_to_decision(&prs);
        assert_eq!(rows[0].outcome, Outcome::Merged);
        assert_eq!(rows[0].summary.median_days, Some(3.0));
        assert_eq!(rows[1].summary.median_days, Some(20.0));
        assert_eq!(rows[1].summary.sample_size, 1);
    }

    #[test]
    fn test_author_comments_are_not_responses() {
        let prs = vec![pr(1, at(2024, 1, 1), None, None), pr(2, at(2024, 1, 1), None, None)];
        let activity = |actor: &str, action, number, day| ContributorActivity {
            repo: Repository::Eips,
            actor: actor.into(),
            role: ContributorRole::Editor,
            action,
            pr_number: Some(number),
            occurred_at: at(2024, 1, day),
        };
        let items = vec![
            activity("author", ActivityAction::Commented, 1, 2),
            activity("editor", ActivityAction::Committed, 1, 3),
            activity("editor", ActivityAction::Reviewed, 1, 5),
            activity("editor", ActivityAction::Commented, 1, 9),
        ];
        let summary = median_response_days(&prs, &items, None);
        assert_eq!(summary.summary.median_days, Some(4.0));
        assert_eq!(summary.awaiting_response, 1);
    }
}
