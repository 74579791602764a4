#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use eip_insights::config::AppConfig;
use eip_insights::database::models::*;
use eip_insights::database::Database;
use eip_insights::scoring::BottleneckClassifier;
use eip_insights::AnalyticsService;

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory().await.expect("Failed to create test database")
}

pub fn service_for(db: &Database) -> AnalyticsService {
    AnalyticsService::new(db.store(), AppConfig::default(), BottleneckClassifier::builtin().expect("Built-in rules compile"))
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn eip(number: i64) -> ProposalKey {
    ProposalKey::new(Repository::Eips, number)
}

pub fn erc(number: i64) -> ProposalKey {
    ProposalKey::new(Repository::Ercs, number)
}

pub fn proposal(key: ProposalKey, title: &str, created_at: DateTime<Utc>) -> Proposal {
    Proposal {
        key,
        title: title.to_string(),
        authors: vec!["alice".to_string()],
        created_at,
        requires: vec![],
    }
}

pub fn status_event(
    key: ProposalKey,
    from: Option<&str>,
    to: &str,
    changed_at: DateTime<Utc>,
) -> StatusEvent {
    StatusEvent {
        key,
        from_status: from.map(String::from),
        to_status: to.to_string(),
        changed_at,
        commit_sha: None,
        pr_number: None,
    }
}

/// Insert a proposal and walk it through `path`, one status per entry.
pub async fn seed_lifecycle(
    db: &Database,
    key: ProposalKey,
    title: &str,
    path: &[(&str, DateTime<Utc>)],
) {
    let created_at = path.first().map(|(_, at)| *at).unwrap_or_else(|| at(2023, 1, 1));
    db.insert_proposal(&proposal(key, title, created_at))
        .await
        .expect("Failed to insert proposal");

    let mut previous: Option<&str> = None;
    for (status, changed_at) in path {
        db.append_status_event(&status_event(key, previous, status, *changed_at))
            .await
            .expect("Failed to append status event");
        previous = Some(*status);
    }
}

pub async fn set_category(db: &Database, key: ProposalKey, category: &str, changed_at: DateTime<Utc>) {
    db.append_category_event(&CategoryEvent {
        key,
        from_category: None,
        to_category: category.to_string(),
        changed_at,
    })
    .await
    .expect("Failed to append category event");
}

pub fn pull_request(
    number: i64,
    title: &str,
    created_at: DateTime<Utc>,
    labels: &[&str],
) -> PullRequest {
    PullRequest {
        repo: Repository::Eips,
        number,
        title: title.to_string(),
        author: "author".to_string(),
        state: PrState::Open,
        created_at,
        merged_at: None,
        closed_at: None,
        comment_count: 0,
        review_count: 0,
        commit_count: 1,
        file_count: 1,
        labels: labels.iter().map(|l| l.to_string()).collect(),
    }
}

pub async fn seed_pull_request(db: &Database, pr: &PullRequest, proposal: Option<ProposalKey>) {
    db.upsert_pull_request(pr).await.expect("Failed to upsert pull request");
    if let Some(proposal) = proposal {
        db.link_pull_request(&PullRequestLink {
            pr_repo: pr.repo,
            pr_number: pr.number,
            proposal,
        })
        .await
        .expect("Failed to link pull request");
    }
}

pub async fn seed_activity(
    db: &Database,
    actor: &str,
    role: ContributorRole,
    action: ActivityAction,
    pr_number: i64,
    occurred_at: DateTime<Utc>,
) {
    db.record_activity(&ContributorActivity {
        repo: Repository::Eips,
        actor: actor.to_string(),
        role,
        action,
        pr_number: Some(pr_number),
        occurred_at,
    })
    .await
    .expect("Failed to record activity");
}

pub async fn seed_waiting(db: &Database, pr_number: i64, state: GovernanceState, days: i64, as_of: DateTime<Utc>) {
    db.upsert_governance_state(&GovernanceStateRow {
        repo: Repository::Eips,
        pr_number,
        state,
        waiting_since: as_of - Duration::days(days),
        updated_at: as_of,
    })
    .await
    .expect("Failed to upsert governance state");
}

/// A small but complete governance dataset, observed as of 2024-06-30.
///
/// - EIP-100: Draft -> Review -> Final during 2024
/// - EIP-200: Draft -> Review -> Last Call, moved to Last Call in June
/// - EIP-300: Draft -> Stagnant -> Draft (reopened)
/// - ERC-20:  Final since 2015
/// - Open PRs #1 (typo), #2 (dependency bump, labelled c-new), #3 (new EIP)
pub async fn seed_governance(db: &Database) -> DateTime<Utc> {
    let as_of = at(2024, 6, 30);

    seed_lifecycle(
        db,
        eip(100),
        "Fee market change",
        &[("Draft", at(2024, 1, 1)), ("Review", at(2024, 2, 1)), ("Final", at(2024, 4, 1))],
    )
    .await;
    seed_lifecycle(
        db,
        eip(200),
        "Blob transactions",
        &[
            ("Draft", at(2024, 3, 1)),
            ("Review", at(2024, 4, 15)),
            ("Last Call", at(2024, 6, 25)),
        ],
    )
    .await;
    seed_lifecycle(
        db,
        eip(300),
        "Account abstraction",
        &[("Draft", at(2023, 1, 10)), ("Stagnant", at(2023, 9, 1)), ("Draft", at(2024, 5, 2))],
    )
    .await;
    seed_lifecycle(db, erc(20), "Token standard", &[("Final", at(2015, 11, 19))]).await;

    set_category(db, eip(100), "Core", at(2024, 1, 2)).await;
    set_category(db, eip(200), "Core", at(2024, 3, 2)).await;
    set_category(db, eip(300), "Interface", at(2024, 5, 3)).await;
    set_category(db, erc(20), "ERC", at(2015, 11, 20)).await;

    seed_pull_request(db, &pull_request(1, "Fix typo in EIP-200", at(2024, 6, 20), &[]), Some(eip(200))).await;
    seed_pull_request(
        db,
        &pull_request(2, "Bump lodash from 1.0 to 1.1", at(2024, 6, 1), &["c-new", "dependencies"]),
        None,
    )
    .await;
    seed_pull_request(db, &pull_request(3, "Add EIP: Gas repricing", at(2024, 4, 1), &["c-new"]), Some(eip(300))).await;

    let mut merged = pull_request(4, "Move EIP-100 to Final", at(2024, 3, 20), &["c-status"]);
    merged.state = PrState::Closed;
    merged.merged_at = Some(at(2024, 4, 1));
    merged.closed_at = Some(at(2024, 4, 1));
    seed_pull_request(db, &merged, Some(eip(100))).await;

    seed_activity(db, "editor-a", ContributorRole::Editor, ActivityAction::Reviewed, 1, at(2024, 6, 27)).await;
    seed_activity(db, "editor-a", ContributorRole::Editor, ActivityAction::Commented, 1, at(2024, 6, 28)).await;
    seed_activity(db, "author", ContributorRole::Contributor, ActivityAction::Committed, 1, at(2024, 6, 29)).await;
    seed_activity(db, "editor-b", ContributorRole::Editor, ActivityAction::Reviewed, 3, at(2024, 4, 5)).await;
    seed_activity(db, "editor-b", ContributorRole::Editor, ActivityAction::StatusChange, 4, at(2024, 4, 1)).await;

    seed_waiting(db, 1, GovernanceState::WaitingOnEditor, 3, as_of).await;
    seed_waiting(db, 2, GovernanceState::WaitingOnAuthor, 29, as_of).await;
    seed_waiting(db, 3, GovernanceState::Stalled, 90, as_of).await;

    as_of
}
