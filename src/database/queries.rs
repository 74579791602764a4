//! Read-only access to the event logs and current-state tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use super::models::*;
use super::predicate::Predicate;
use crate::error::InsightsError;
use crate::filters::DateWindow;

/// The three proposal event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Status,
    Category,
    Deadline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "lowercase")]
pub enum StreamEvent {
    Status(StatusEvent),
    Category(CategoryEvent),
    Deadline(DeadlineEvent),
}

impl StreamEvent {
    pub fn changed_at(&self) -> DateTime<Utc> {
        match self {
            StreamEvent::Status(e) => e.changed_at,
            StreamEvent::Category(e) => e.changed_at,
            StreamEvent::Deadline(e) => e.changed_at,
        }
    }

    pub fn key(&self) -> ProposalKey {
        match self {
            StreamEvent::Status(e) => e.key,
            StreamEvent::Category(e) => e.key,
            StreamEvent::Deadline(e) => e.key,
        }
    }
}

#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch<T>(
        &self,
        select: &str,
        predicate: &Predicate,
        order_by: &str,
        map: fn(&SqliteRow) -> Result<T, InsightsError>,
    ) -> Result<Vec<T>, InsightsError> {
        let mut builder = QueryBuilder::<Sqlite>::new(select);
        predicate.push_where(&mut builder);
        builder.push(" ORDER BY ").push(order_by);
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(map).collect()
    }

    pub async fn get_proposal(&self, key: ProposalKey) -> Result<Option<Proposal>, InsightsError> {
        let rows = self
            .fetch(
                PROPOSAL_SELECT,
                &key_predicate("repo", "number", key),
                "number",
                proposal_from_row,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_proposals(&self, repo: Option<Repository>) -> Result<Vec<Proposal>, InsightsError> {
        self.fetch(
            PROPOSAL_SELECT,
            &Predicate::repo("repo", repo),
            "repo, number",
            proposal_from_row,
        )
        .await
    }

    pub async fn get_snapshot(
        &self,
        key: ProposalKey,
    ) -> Result<Option<ProposalSnapshot>, InsightsError> {
        let rows = self
            .fetch(
                SNAPSHOT_SELECT,
                &key_predicate("repo", "number", key),
                "number",
                snapshot_from_row,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_snapshots(
        &self,
        repo: Option<Repository>,
    ) -> Result<Vec<ProposalSnapshot>, InsightsError> {
        self.fetch(
            SNAPSHOT_SELECT,
            &Predicate::repo("repo", repo),
            "repo, number",
            snapshot_from_row,
        )
        .await
    }

    /// Status history of one proposal, oldest first. Unknown proposals have
    /// an empty history.
    pub async fn list_status_events(
        &self,
        key: ProposalKey,
    ) -> Result<Vec<StatusEvent>, InsightsError> {
        self.fetch(
            STATUS_EVENT_SELECT,
            &key_predicate("repo", "number", key),
            "changed_at, id",
            status_event_from_row,
        )
        .await
    }

    pub async fn list_category_events(
        &self,
        key: ProposalKey,
    ) -> Result<Vec<CategoryEvent>, InsightsError> {
        self.fetch(
            CATEGORY_EVENT_SELECT,
            &key_predicate("repo", "number", key),
            "changed_at, id",
            category_event_from_row,
        )
        .await
    }

    pub async fn list_deadline_events(
        &self,
        key: ProposalKey,
    ) -> Result<Vec<DeadlineEvent>, InsightsError> {
        self.fetch(
            DEADLINE_EVENT_SELECT,
            &key_predicate("repo", "number", key),
            "changed_at, id",
            deadline_event_from_row,
        )
        .await
    }

    /// Status events of all proposals inside the window, oldest first.
    pub async fn list_status_events_in_window(
        &self,
        window: &DateWindow,
        repo: Option<Repository>,
    ) -> Result<Vec<StatusEvent>, InsightsError> {
        let predicate = Predicate::repo("repo", repo).and(window.predicate("changed_at"));
        let events = self
            .fetch(
                STATUS_EVENT_SELECT,
                &predicate,
                "changed_at, id",
                status_event_from_row,
            )
            .await?;
        debug!("Loaded {} status events in window", events.len());
        Ok(events)
    }

    /// Events of one stream inside the window, oldest first; grouping is left
    /// to the caller.
    pub async fn list_events_in_window(
        &self,
        kind: StreamKind,
        window: &DateWindow,
        repo: Option<Repository>,
    ) -> Result<Vec<StreamEvent>, InsightsError> {
        let predicate = Predicate::repo("repo", repo).and(window.predicate("changed_at"));
        let events = match kind {
            StreamKind::Status => self
                .fetch(STATUS_EVENT_SELECT, &predicate, "changed_at, id", status_event_from_row)
                .await?
                .into_iter()
                .map(StreamEvent::Status)
                .collect(),
            StreamKind::Category => self
                .fetch(CATEGORY_EVENT_SELECT, &predicate, "changed_at, id", category_event_from_row)
                .await?
                .into_iter()
                .map(StreamEvent::Category)
                .collect(),
            StreamKind::Deadline => self
                .fetch(DEADLINE_EVENT_SELECT, &predicate, "changed_at, id", deadline_event_from_row)
                .await?
                .into_iter()
                .map(StreamEvent::Deadline)
                .collect(),
        };
        Ok(events)
    }

    pub async fn list_pull_requests(
        &self,
        repo: Option<Repository>,
        state: Option<PrState>,
    ) -> Result<Vec<PullRequest>, InsightsError> {
        let predicate = Predicate::repo("repo", repo).and(
            state
                .map(|s| Predicate::eq("state", s.as_str()))
                .unwrap_or(Predicate::True),
        );
        self.fetch(PULL_REQUEST_SELECT, &predicate, "repo, number", pull_request_from_row)
            .await
    }

    pub async fn get_pull_request(
        &self,
        repo: Repository,
        number: i64,
    ) -> Result<Option<PullRequest>, InsightsError> {
        let rows = self
            .fetch(
                PULL_REQUEST_SELECT,
                &key_predicate("repo", "number", ProposalKey::new(repo, number)),
                "number",
                pull_request_from_row,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_pull_request_links(
        &self,
        repo: Option<Repository>,
    ) -> Result<Vec<PullRequestLink>, InsightsError> {
        self.fetch(
            LINK_SELECT,
            &Predicate::repo("proposal_repo", repo),
            "pr_repo, pr_number, proposal_repo, proposal_number",
            link_from_row,
        )
        .await
    }

    /// Pull requests linked to one proposal, by PR number.
    pub async fn list_pull_requests_for_proposal(
        &self,
        key: ProposalKey,
    ) -> Result<Vec<PullRequest>, InsightsError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT pr.repo, pr.number, pr.title, pr.author, pr.state, pr.created_at, \
             pr.merged_at, pr.closed_at, pr.comment_count, pr.review_count, pr.commit_count, \
             pr.file_count, pr.labels \
             FROM pull_requests pr \
             JOIN pull_request_proposals l ON l.pr_repo = pr.repo AND l.pr_number = pr.number",
        );
        key_predicate("l.proposal_repo", "l.proposal_number", key).push_where(&mut builder);
        builder.push(" ORDER BY pr.number");
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(pull_request_from_row).collect()
    }

    pub async fn list_governance_states(
        &self,
        repo: Option<Repository>,
    ) -> Result<Vec<GovernanceStateRow>, InsightsError> {
        self.fetch(
            GOVERNANCE_STATE_SELECT,
            &Predicate::repo("repo", repo),
            "repo, pr_number",
            governance_state_from_row,
        )
        .await
    }

    pub async fn list_activity(
        &self,
        window: &DateWindow,
        repo: Option<Repository>,
    ) -> Result<Vec<ContributorActivity>, InsightsError> {
        let predicate = Predicate::repo("repo", repo).and(window.predicate("occurred_at"));
        self.fetch(ACTIVITY_SELECT, &predicate, "occurred_at, id", activity_from_row)
            .await
    }

    pub async fn list_upgrades(&self) -> Result<Vec<Upgrade>, InsightsError> {
        self.fetch(UPGRADE_SELECT, &Predicate::True, "id", upgrade_from_row)
            .await
    }

    pub async fn get_upgrade_by_slug(&self, slug: &str) -> Result<Option<Upgrade>, InsightsError> {
        let rows = self
            .fetch(UPGRADE_SELECT, &Predicate::eq("slug", slug), "id", upgrade_from_row)
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Composition log of one upgrade up to (excluding) `until`, oldest first.
    pub async fn list_composition_events(
        &self,
        upgrade_id: i64,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<UpgradeCompositionEvent>, InsightsError> {
        let predicate = Predicate::eq("upgrade_id", upgrade_id)
            .and(Predicate::window("changed_at", None, until));
        self.fetch(
            COMPOSITION_EVENT_SELECT,
            &predicate,
            "changed_at, id",
            composition_event_from_row,
        )
        .await
    }

    /// Every status event in the order it was written.
    pub async fn list_status_events_as_written(&self) -> Result<Vec<StatusEvent>, InsightsError> {
        self.fetch(STATUS_EVENT_SELECT, &Predicate::True, "id", status_event_from_row)
            .await
    }

    /// Every composition change, across upgrades, in the order it was written.
    pub async fn list_composition_events_as_written(
        &self,
    ) -> Result<Vec<UpgradeCompositionEvent>, InsightsError> {
        self.fetch(
            COMPOSITION_EVENT_SELECT,
            &Predicate::True,
            "id",
            composition_event_from_row,
        )
        .await
    }

    pub async fn list_composition_current(
        &self,
        upgrade_id: Option<i64>,
    ) -> Result<Vec<UpgradeCompositionEntry>, InsightsError> {
        let predicate = upgrade_id
            .map(|id| Predicate::eq("upgrade_id", id))
            .unwrap_or(Predicate::True);
        self.fetch(
            COMPOSITION_CURRENT_SELECT,
            &predicate,
            "upgrade_id, proposal_repo, proposal_number",
            composition_entry_from_row,
        )
        .await
    }
}

const PROPOSAL_SELECT: &str =
    "SELECT repo, number, title, authors, created_at, requires FROM proposals";
const SNAPSHOT_SELECT: &str = "SELECT repo, number, status, proposal_type, category, deadline, \
     updated_at FROM proposal_snapshots";
const STATUS_EVENT_SELECT: &str = "SELECT repo, number, from_status, to_status, changed_at, \
     commit_sha, pr_number FROM status_events";
const CATEGORY_EVENT_SELECT: &str =
    "SELECT repo, number, from_category, to_category, changed_at FROM category_events";
const DEADLINE_EVENT_SELECT: &str =
    "SELECT repo, number, from_deadline, to_deadline, changed_at FROM deadline_events";
const PULL_REQUEST_SELECT: &str = "SELECT repo, number, title, author, state, created_at, \
     merged_at, closed_at, comment_count, review_count, commit_count, file_count, labels \
     FROM pull_requests";
const LINK_SELECT: &str =
    "SELECT pr_repo, pr_number, proposal_repo, proposal_number FROM pull_request_proposals";
const GOVERNANCE_STATE_SELECT: &str =
    "SELECT repo, pr_number, state, waiting_since, updated_at FROM governance_states";
const ACTIVITY_SELECT: &str =
    "SELECT repo, actor, role, action, pr_number, occurred_at FROM contributor_activity";
const UPGRADE_SELECT: &str = "SELECT id, slug, name, activated_at FROM upgrades";
const COMPOSITION_EVENT_SELECT: &str = "SELECT upgrade_id, proposal_repo, proposal_number, \
     bucket, changed_at FROM upgrade_composition_events";
const COMPOSITION_CURRENT_SELECT: &str = "SELECT upgrade_id, proposal_repo, proposal_number, \
     bucket, updated_at FROM upgrade_composition_current";

fn key_predicate(repo_column: &'static str, number_column: &'static str, key: ProposalKey) -> Predicate {
    Predicate::all([
        Predicate::eq(repo_column, key.repo),
        Predicate::eq(number_column, key.number),
    ])
}

fn repo_column(row: &SqliteRow, column: &str) -> Result<Repository, InsightsError> {
    let raw: String = row.try_get(column)?;
    raw.parse::<Repository>().map_err(|_| {
        InsightsError::DatabaseError(format!("Unknown repository {:?} in column {}", raw, column))
    })
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
) -> Result<T, InsightsError> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}

fn parsed_column<T>(row: &SqliteRow, column: &str) -> Result<T, InsightsError>
where
    T: std::str::FromStr<Err = InsightsError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| InsightsError::DatabaseError(format!("Column {}: {}", column, e)))
}

fn proposal_key(row: &SqliteRow, repo: &str, number: &str) -> Result<ProposalKey, InsightsError> {
    Ok(ProposalKey::new(repo_column(row, repo)?, row.try_get(number)?))
}

fn proposal_from_row(row: &SqliteRow) -> Result<Proposal, InsightsError> {
    Ok(Proposal {
        key: proposal_key(row, "repo", "number")?,
        title: row.try_get("title")?,
        authors: json_column(row, "authors")?,
        created_at: row.try_get("created_at")?,
        requires: json_column(row, "requires")?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<ProposalSnapshot, InsightsError> {
    Ok(ProposalSnapshot {
        key: proposal_key(row, "repo", "number")?,
        status: row.try_get("status")?,
        proposal_type: row.try_get("proposal_type")?,
        category: row.try_get("category")?,
        deadline: row.try_get("deadline")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn status_event_from_row(row: &SqliteRow) -> Result<StatusEvent, InsightsError> {
    Ok(StatusEvent {
        key: proposal_key(row, "repo", "number")?,
        from_status: row.try_get("from_status")?,
        to_status: row.try_get("to_status")?,
        changed_at: row.try_get("changed_at")?,
        commit_sha: row.try_get("commit_sha")?,
        pr_number: row.try_get("pr_number")?,
    })
}

fn category_event_from_row(row: &SqliteRow) -> Result<CategoryEvent, InsightsError> {
    Ok(CategoryEvent {
        key: proposal_key(row, "repo", "number")?,
        from_category: row.try_get("from_category")?,
        to_category: row.try_get("to_category")?,
        changed_at: row.try_get("changed_at")?,
    })
}

fn deadline_event_from_row(row: &SqliteRow) -> Result<DeadlineEvent, InsightsError> {
    Ok(DeadlineEvent {
        key: proposal_key(row, "repo", "number")?,
        from_deadline: row.try_get("from_deadline")?,
        to_deadline: row.try_get("to_deadline")?,
        changed_at: row.try_get("changed_at")?,
    })
}

fn pull_request_from_row(row: &SqliteRow) -> Result<PullRequest, InsightsError> {
    Ok(PullRequest {
        repo: repo_column(row, "repo")?,
        number: row.try_get("number")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        state: parsed_column(row, "state")?,
        created_at: row.try_get("created_at")?,
        merged_at: row.try_get("merged_at")?,
        closed_at: row.try_get("closed_at")?,
        comment_count: row.try_get("comment_count")?,
        review_count: row.try_get("review_count")?,
        commit_count: row.try_get("commit_count")?,
        file_count: row.try_get("file_count")?,
        labels: json_column(row, "labels")?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<PullRequestLink, InsightsError> {
    Ok(PullRequestLink {
        pr_repo: repo_column(row, "pr_repo")?,
        pr_number: row.try_get("pr_number")?,
        proposal: proposal_key(row, "proposal_repo", "proposal_number")?,
    })
}

fn governance_state_from_row(row: &SqliteRow) -> Result<GovernanceStateRow, InsightsError> {
    Ok(GovernanceStateRow {
        repo: repo_column(row, "repo")?,
        pr_number: row.try_get("pr_number")?,
        state: parsed_column(row, "state")?,
        waiting_since: row.try_get("waiting_since")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn activity_from_row(row: &SqliteRow) -> Result<ContributorActivity, InsightsError> {
    Ok(ContributorActivity {
        repo: repo_column(row, "repo")?,
        actor: row.try_get("actor")?,
        role: parsed_column(row, "role")?,
        action: parsed_column(row, "action")?,
        pr_number: row.try_get("pr_number")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn upgrade_from_row(row: &SqliteRow) -> Result<Upgrade, InsightsError> {
    Ok(Upgrade {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        activated_at: row.try_get("activated_at")?,
    })
}

fn composition_event_from_row(row: &SqliteRow) -> Result<UpgradeCompositionEvent, InsightsError> {
    let bucket: Option<String> = row.try_get("bucket")?;
    let bucket = bucket
        .map(|b| b.parse::<CompositionBucket>())
        .transpose()
        .map_err(|e| InsightsError::DatabaseError(format!("Column bucket: {}", e)))?;
    Ok(UpgradeCompositionEvent {
        upgrade_id: row.try_get("upgrade_id")?,
        proposal: proposal_key(row, "proposal_repo", "proposal_number")?,
        bucket,
        changed_at: row.try_get("changed_at")?,
    })
}

fn composition_entry_from_row(row: &SqliteRow) -> Result<UpgradeCompositionEntry, InsightsError> {
    Ok(UpgradeCompositionEntry {
        upgrade_id: row.try_get("upgrade_id")?,
        proposal: proposal_key(row, "proposal_repo", "proposal_number")?,
        bucket: parsed_column(row, "bucket")?,
        updated_at: row.try_get("updated_at")?,
    })
}
