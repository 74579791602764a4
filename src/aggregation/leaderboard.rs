//! Contributor rankings over the activity log.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::database::models::{ActivityAction, ContributorActivity, ContributorRole};
use crate::error::InsightsError;
use crate::filters::SortDir;

/// Sortable leaderboard columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardSort {
    #[default]
    Total,
    Reviews,
    Comments,
    Commits,
    PrsOpened,
    StatusChanges,
    Actor,
}

impl FromStr for LeaderboardSort {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "total" => Ok(LeaderboardSort::Total),
            "reviews" => Ok(LeaderboardSort::Reviews),
            "comments" => Ok(LeaderboardSort::Comments),
            "commits" => Ok(LeaderboardSort::Commits),
            "prs_opened" | "prsopened" => Ok(LeaderboardSort::PrsOpened),
            "status_changes" | "statuschanges" => Ok(LeaderboardSort::StatusChanges),
            "actor" => Ok(LeaderboardSort::Actor),
            _ => Err(InsightsError::invalid_filter(
                "sortBy",
                s,
                "expected one of total, reviews, comments, commits, prs_opened, status_changes, actor",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub actor: String,
    /// Most senior role the actor acted under in the window.
    pub role: ContributorRole,
    pub reviews: u64,
    pub comments: u64,
    pub commits: u64,
    pub prs_opened: u64,
    pub status_changes: u64,
    pub total: u64,
}

impl LeaderboardRow {
    fn new(actor: &str, role: ContributorRole) -> Self {
        Self {
            actor: actor.to_string(),
            role,
            reviews: 0,
            comments: 0,
            commits: 0,
            prs_opened: 0,
            status_changes: 0,
            total: 0,
        }
    }

    fn record(&mut self, action: ActivityAction) {
        match action {
            ActivityAction::Reviewed => self.reviews += 1,
            ActivityAction::Commented => self.comments += 1,
            ActivityAction::Committed => self.commits += 1,
            ActivityAction::Opened => self.prs_opened += 1,
            ActivityAction::StatusChange => self.status_changes += 1,
        }
        self.total += 1;
    }

    fn column(&self, sort: LeaderboardSort) -> u64 {
        match sort {
            LeaderboardSort::Total | LeaderboardSort::Actor => self.total,
            LeaderboardSort::Reviews => self.reviews,
            LeaderboardSort::Comments => self.comments,
            LeaderboardSort::Commits => self.commits,
            LeaderboardSort::PrsOpened => self.prs_opened,
            LeaderboardSort::StatusChanges => self.status_changes,
        }
    }
}

/// Per-actor action counts, optionally restricted to one role.
///
/// Ties on the sort column are broken by actor name ascending regardless of
/// `dir`, so equal scores always list in the same order.
pub fn contributor_leaderboard(
    activity: &[ContributorActivity],
    role: Option<ContributorRole>,
    sort: LeaderboardSort,
    dir: SortDir,
    limit: usize,
) -> Vec<LeaderboardRow> {
    let mut rows: BTreeMap<&str, LeaderboardRow> = BTreeMap::new();
    for item in activity.iter().filter(|a| role.map_or(true, |r| a.role == r)) {
        let row = rows
            .entry(item.actor.as_str())
            .or_insert_with(|| LeaderboardRow::new(&item.actor, item.role));
        row.role = row.role.min(item.role);
        row.record(item.action);
    }

    let mut rows: Vec<LeaderboardRow> = rows.into_values().collect();
    rows.sort_by(|a, b| {
        let primary = if sort == LeaderboardSort::Actor {
            a.actor.cmp(&b.actor)
        } else {
            a.column(sort).cmp(&b.column(sort))
        };
        let primary = match dir {
            SortDir::Asc => primary,
            SortDir::Desc => primary.reverse(),
        };
        match primary {
            Ordering::Equal => a.actor.cmp(&b.actor),
            other => other,
        }
    });
    rows.truncate(limit);
    rows
}
