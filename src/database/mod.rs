pub mod models;
pub mod predicate;
pub mod queries;
pub mod schema;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info};

use crate::error::InsightsError;
use models::*;
use queries::EventStore;

/// Connection handle for the governance event store.
///
/// Reads go through [`EventStore`]. The write helpers below exist for the
/// ingestion side and test fixtures; they keep the producer contract
/// (ordered appends, one current row per entity).
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, InsightsError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        info!("Connected to event store at {}", database_url);
        Ok(Database { pool })
    }

    /// Single pinned connection: every connection to `sqlite::memory:` opens
    /// a fresh database, so the pool must never recycle it.
    pub async fn new_in_memory() -> Result<Self, InsightsError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn store(&self) -> EventStore {
        EventStore::new(self.pool.clone())
    }

    pub async fn run_migrations(&self) -> Result<(), InsightsError> {
        sqlx::raw_sql(schema::INITIAL_SCHEMA)
            .execute(&self.pool)
            .await?;
        debug!("Event store schema is up to date");
        Ok(())
    }

    /// Insert a proposal, or correct its title, authors and requirements.
    pub async fn insert_proposal(&self, proposal: &Proposal) -> Result<(), InsightsError> {
        sqlx::query(
            r#"
            INSERT INTO proposals (repo, number, title, authors, created_at, requires)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (repo, number) DO UPDATE SET
                title = excluded.title,
                authors = excluded.authors,
                requires = excluded.requires
            "#,
        )
        .bind(proposal.key.repo.as_str())
        .bind(proposal.key.number)
        .bind(&proposal.title)
        .bind(serde_json::to_string(&proposal.authors)?)
        .bind(proposal.created_at)
        .bind(serde_json::to_string(&proposal.requires)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_snapshot(&self, snapshot: &ProposalSnapshot) -> Result<(), InsightsError> {
        sqlx::query(
            r#"
            INSERT INTO proposal_snapshots
                (repo, number, status, proposal_type, category, deadline, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (repo, number) DO UPDATE SET
                status = excluded.status,
                proposal_type = excluded.proposal_type,
                category = excluded.category,
                deadline = excluded.deadline,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.key.repo.as_str())
        .bind(snapshot.key.number)
        .bind(&snapshot.status)
        .bind(&snapshot.proposal_type)
        .bind(&snapshot.category)
        .bind(snapshot.deadline)
        .bind(snapshot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append a status transition and move the snapshot to its `to_status`.
    /// Transitions are recorded as observed; only time order is enforced.
    pub async fn append_status_event(&self, event: &StatusEvent) -> Result<(), InsightsError> {
        let mut tx = self.pool.begin().await?;
        ensure_ordered(&mut tx, "status_events", &event.key, event.changed_at).await?;

        sqlx::query(
            r#"
            INSERT INTO status_events
                (repo, number, from_status, to_status, changed_at, commit_sha, pr_number)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.key.repo.as_str())
        .bind(event.key.number)
        .bind(&event.from_status)
        .bind(&event.to_status)
        .bind(event.changed_at)
        .bind(&event.commit_sha)
        .bind(event.pr_number)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO proposal_snapshots (repo, number, status, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (repo, number) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(event.key.repo.as_str())
        .bind(event.key.number)
        .bind(&event.to_status)
        .bind(event.changed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            "Recorded {} status change {:?} -> {}",
            event.key, event.from_status, event.to_status
        );
        Ok(())
    }

    pub async fn append_category_event(&self, event: &CategoryEvent) -> Result<(), InsightsError> {
        let mut tx = self.pool.begin().await?;
        ensure_ordered(&mut tx, "category_events", &event.key, event.changed_at).await?;

        sqlx::query(
            r#"
            INSERT INTO category_events (repo, number, from_category, to_category, changed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.key.repo.as_str())
        .bind(event.key.number)
        .bind(&event.from_category)
        .bind(&event.to_category)
        .bind(event.changed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE proposal_snapshots SET category = ?, updated_at = ? WHERE repo = ? AND number = ?",
        )
        .bind(&event.to_category)
        .bind(event.changed_at)
        .bind(event.key.repo.as_str())
        .bind(event.key.number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn append_deadline_event(&self, event: &DeadlineEvent) -> Result<(), InsightsError> {
        let mut tx = self.pool.begin().await?;
        ensure_ordered(&mut tx, "deadline_events", &event.key, event.changed_at).await?;

        sqlx::query(
            r#"
            INSERT INTO deadline_events (repo, number, from_deadline, to_deadline, changed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.key.repo.as_str())
        .bind(event.key.number)
        .bind(event.from_deadline)
        .bind(event.to_deadline)
        .bind(event.changed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE proposal_snapshots SET deadline = ?, updated_at = ? WHERE repo = ? AND number = ?",
        )
        .bind(event.to_deadline)
        .bind(event.changed_at)
        .bind(event.key.repo.as_str())
        .bind(event.key.number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_pull_request(&self, pr: &PullRequest) -> Result<(), InsightsError> {
        sqlx::query(
            r#"
            INSERT INTO pull_requests
                (repo, number, title, author, state, created_at, merged_at, closed_at,
                 comment_count, review_count, commit_count, file_count, labels)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (repo, number) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                state = excluded.state,
                merged_at = excluded.merged_at,
                closed_at = excluded.closed_at,
                comment_count = excluded.comment_count,
                review_count = excluded.review_count,
                commit_count = excluded.commit_count,
                file_count = excluded.file_count,
                labels = excluded.labels
            "#,
        )
        .bind(pr.repo.as_str())
        .bind(pr.number)
        .bind(&pr.title)
        .bind(&pr.author)
        .bind(pr.state.as_str())
        .bind(pr.created_at)
        .bind(pr.merged_at)
        .bind(pr.closed_at)
        .bind(pr.comment_count)
        .bind(pr.review_count)
        .bind(pr.commit_count)
        .bind(pr.file_count)
        .bind(serde_json::to_string(&pr.labels)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn link_pull_request(&self, link: &PullRequestLink) -> Result<(), InsightsError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO pull_request_proposals
                (pr_repo, pr_number, proposal_repo, proposal_number)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(link.pr_repo.as_str())
        .bind(link.pr_number)
        .bind(link.proposal.repo.as_str())
        .bind(link.proposal.number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// One row per `(repo, pr_number)`; later observations replace earlier ones.
    pub async fn upsert_governance_state(&self, row: &GovernanceStateRow) -> Result<(), InsightsError> {
        sqlx::query(
            r#"
            INSERT INTO governance_states (repo, pr_number, state, waiting_since, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (repo, pr_number) DO UPDATE SET
                state = excluded.state,
                waiting_since = excluded.waiting_since,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(row.repo.as_str())
        .bind(row.pr_number)
        .bind(row.state.as_str())
        .bind(row.waiting_since)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_activity(&self, activity: &ContributorActivity) -> Result<(), InsightsError> {
        sqlx::query(
            r#"
            INSERT INTO contributor_activity (repo, actor, role, action, pr_number, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(activity.repo.as_str())
        .bind(&activity.actor)
        .bind(activity.role.as_str())
        .bind(activity.action.as_str())
        .bind(activity.pr_number)
        .bind(activity.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_upgrade(
        &self,
        slug: &str,
        name: &str,
        activated_at: Option<DateTime<Utc>>,
    ) -> Result<i64, InsightsError> {
        let result = sqlx::query("INSERT INTO upgrades (slug, name, activated_at) VALUES (?, ?, ?)")
            .bind(slug)
            .bind(name)
            .bind(activated_at)
            .execute(&self.pool)
            .await?;
        let upgrade_id = result.last_insert_rowid();
        info!("Registered upgrade {} (ID: {})", slug, upgrade_id);
        Ok(upgrade_id)
    }

    /// Append a composition change and apply it to the current table.
    pub async fn append_composition_event(
        &self,
        event: &UpgradeCompositionEvent,
    ) -> Result<(), InsightsError> {
        let mut tx = self.pool.begin().await?;

        let latest = sqlx::query(
            r#"
            SELECT changed_at FROM upgrade_composition_events
            WHERE upgrade_id = ? AND proposal_repo = ? AND proposal_number = ?
            ORDER BY changed_at DESC LIMIT 1
            "#,
        )
        .bind(event.upgrade_id)
        .bind(event.proposal.repo.as_str())
        .bind(event.proposal.number)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = latest {
            let latest: DateTime<Utc> = row.try_get("changed_at")?;
            if event.changed_at < latest {
                return Err(InsightsError::ValidationError(format!(
                    "Out-of-order composition change for {} in upgrade {}: {} is before {}",
                    event.proposal, event.upgrade_id, event.changed_at, latest
                )));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO upgrade_composition_events
                (upgrade_id, proposal_repo, proposal_number, bucket, changed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.upgrade_id)
        .bind(event.proposal.repo.as_str())
        .bind(event.proposal.number)
        .bind(event.bucket.map(|b| b.as_str()))
        .bind(event.changed_at)
        .execute(&mut *tx)
        .await?;

        match event.bucket {
            Some(bucket) => {
                sqlx::query(
                    r#"
                    INSERT INTO upgrade_composition_current
                        (upgrade_id, proposal_repo, proposal_number, bucket, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT (upgrade_id, proposal_repo, proposal_number) DO UPDATE SET
                        bucket = excluded.bucket,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(event.upgrade_id)
                .bind(event.proposal.repo.as_str())
                .bind(event.proposal.number)
                .bind(bucket.as_str())
                .bind(event.changed_at)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    DELETE FROM upgrade_composition_current
                    WHERE upgrade_id = ? AND proposal_repo = ? AND proposal_number = ?
                    "#,
                )
                .bind(event.upgrade_id)
                .bind(event.proposal.repo.as_str())
                .bind(event.proposal.number)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Reject an append that would go back in time for this proposal.
async fn ensure_ordered(
    tx: &mut Transaction<'_, Sqlite>,
    table: &'static str,
    key: &ProposalKey,
    at: DateTime<Utc>,
) -> Result<(), InsightsError> {
    let sql = format!(
        "SELECT changed_at FROM {} WHERE repo = ? AND number = ? ORDER BY changed_at DESC LIMIT 1",
        table
    );
    let latest = sqlx::query(&sql)
        .bind(key.repo.as_str())
        .bind(key.number)
        .fetch_optional(&mut **tx)
        .await?;

    if let Some(row) = latest {
        let latest: DateTime<Utc> = row.try_get("changed_at")?;
        if at < latest {
            return Err(InsightsError::ValidationError(format!(
                "Out-of-order append to {} for {}: {} is before {}",
                table, key, at, latest
            )));
        }
    }
    Ok(())
}
