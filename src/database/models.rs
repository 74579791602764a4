use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InsightsError;

/// Repository family a proposal or pull request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repository {
    Eips,
    Ercs,
    Rips,
}

impl Repository {
    pub const ALL: [Repository; 3] = [Repository::Eips, Repository::Ercs, Repository::Rips];

    pub fn as_str(&self) -> &'static str {
        match self {
            Repository::Eips => "eips",
            Repository::Ercs => "ercs",
            Repository::Rips => "rips",
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Repository {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eips" => Ok(Repository::Eips),
            "ercs" => Ok(Repository::Ercs),
            "rips" => Ok(Repository::Rips),
            _ => Err(InsightsError::invalid_filter(
                "repo",
                s,
                "expected one of eips, ercs, rips",
            )),
        }
    }
}

/// Identity of a proposal: `(repository, number)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalKey {
    pub repo: Repository,
    pub number: i64,
}

impl ProposalKey {
    pub fn new(repo: Repository, number: i64) -> Self {
        Self { repo, number }
    }
}

impl fmt::Display for ProposalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// Canonical proposal statuses. Observed statuses are stored verbatim; this
/// enum only orders and labels them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    Draft,
    Review,
    LastCall,
    Final,
    Stagnant,
    Withdrawn,
    Living,
}

impl ProposalStatus {
    pub const CANONICAL_ORDER: [ProposalStatus; 7] = [
        ProposalStatus::Draft,
        ProposalStatus::Review,
        ProposalStatus::LastCall,
        ProposalStatus::Final,
        ProposalStatus::Stagnant,
        ProposalStatus::Withdrawn,
        ProposalStatus::Living,
    ];

    /// Label used for statuses outside the canonical set.
    pub const FALLBACK_LABEL: &'static str = "Other";

    pub fn label(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "Draft",
            ProposalStatus::Review => "Review",
            ProposalStatus::LastCall => "Last Call",
            ProposalStatus::Final => "Final",
            ProposalStatus::Stagnant => "Stagnant",
            ProposalStatus::Withdrawn => "Withdrawn",
            ProposalStatus::Living => "Living",
        }
    }

    /// Accepts the spelling variants seen in proposal front matter
    /// ("Last Call", "LastCall", "last-call").
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "draft" => Some(ProposalStatus::Draft),
            "review" => Some(ProposalStatus::Review),
            "lastcall" => Some(ProposalStatus::LastCall),
            "final" => Some(ProposalStatus::Final),
            "stagnant" => Some(ProposalStatus::Stagnant),
            "withdrawn" => Some(ProposalStatus::Withdrawn),
            "living" => Some(ProposalStatus::Living),
            _ => None,
        }
    }

    /// Position in the canonical order; unknown statuses sort last.
    pub fn rank_of(label: &str) -> usize {
        Self::from_label(label)
            .and_then(|s| Self::CANONICAL_ORDER.iter().position(|c| *c == s))
            .unwrap_or(Self::CANONICAL_ORDER.len())
    }

    /// Canonical label for a raw status, or the fallback label.
    pub fn bucket_label(label: &str) -> &'static str {
        Self::from_label(label)
            .map(|s| s.label())
            .unwrap_or(Self::FALLBACK_LABEL)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub key: ProposalKey,
    pub title: String,
    pub authors: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Numbers of proposals (same repository) this one requires.
    pub requires: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSnapshot {
    pub key: ProposalKey,
    pub status: String,
    pub proposal_type: Option<String>,
    pub category: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub key: ProposalKey,
    pub from_status: Option<String>,
    pub to_status: String,
    pub changed_at: DateTime<Utc>,
    pub commit_sha: Option<String>,
    pub pr_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEvent {
    pub key: ProposalKey,
    pub from_category: Option<String>,
    pub to_category: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineEvent {
    pub key: ProposalKey,
    pub from_deadline: Option<DateTime<Utc>>,
    pub to_deadline: Option<DateTime<Utc>>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
        }
    }
}

impl FromStr for PrState {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PrState::Open),
            "closed" => Ok(PrState::Closed),
            other => Err(InsightsError::ValidationError(format!(
                "Unknown pull request state: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub repo: Repository,
    pub number: i64,
    pub title: String,
    pub author: String,
    pub state: PrState,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub comment_count: i64,
    pub review_count: i64,
    pub commit_count: i64,
    pub file_count: i64,
    pub labels: Vec<String>,
}

/// One edge of the pull request to proposal many-to-many join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestLink {
    pub pr_repo: Repository,
    pub pr_number: i64,
    pub proposal: ProposalKey,
}

/// Blocking classification of an open pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceState {
    WaitingOnEditor,
    WaitingOnAuthor,
    Stalled,
    Draft,
    NoState,
}

impl GovernanceState {
    pub const ALL: [GovernanceState; 5] = [
        GovernanceState::WaitingOnEditor,
        GovernanceState::WaitingOnAuthor,
        GovernanceState::Stalled,
        GovernanceState::Draft,
        GovernanceState::NoState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GovernanceState::WaitingOnEditor => "WAITING_ON_EDITOR",
            GovernanceState::WaitingOnAuthor => "WAITING_ON_AUTHOR",
            GovernanceState::Stalled => "STALLED",
            GovernanceState::Draft => "DRAFT",
            GovernanceState::NoState => "NO_STATE",
        }
    }
}

impl FromStr for GovernanceState {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GovernanceState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| {
                InsightsError::ValidationError(format!("Unknown governance state: {}", s))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceStateRow {
    pub repo: Repository,
    pub pr_number: i64,
    pub state: GovernanceState,
    pub waiting_since: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Reviewed,
    Commented,
    Committed,
    Opened,
    StatusChange,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Reviewed => "reviewed",
            ActivityAction::Commented => "commented",
            ActivityAction::Committed => "committed",
            ActivityAction::Opened => "opened",
            ActivityAction::StatusChange => "status_change",
        }
    }
}

impl FromStr for ActivityAction {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reviewed" => Ok(ActivityAction::Reviewed),
            "commented" => Ok(ActivityAction::Commented),
            "committed" => Ok(ActivityAction::Committed),
            "opened" => Ok(ActivityAction::Opened),
            "status_change" => Ok(ActivityAction::StatusChange),
            other => Err(InsightsError::ValidationError(format!(
                "Unknown activity action: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContributorRole {
    Editor,
    Reviewer,
    Contributor,
}

impl ContributorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributorRole::Editor => "EDITOR",
            ContributorRole::Reviewer => "REVIEWER",
            ContributorRole::Contributor => "CONTRIBUTOR",
        }
    }
}

impl FromStr for ContributorRole {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EDITOR" => Ok(ContributorRole::Editor),
            "REVIEWER" => Ok(ContributorRole::Reviewer),
            "CONTRIBUTOR" => Ok(ContributorRole::Contributor),
            _ => Err(InsightsError::invalid_filter(
                "role",
                s,
                "expected one of EDITOR, REVIEWER, CONTRIBUTOR",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorActivity {
    pub repo: Repository,
    pub actor: String,
    pub role: ContributorRole,
    pub action: ActivityAction,
    pub pr_number: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Membership bucket of a proposal within a network upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionBucket {
    Considered,
    Scheduled,
    Proposed,
    Declined,
    Included,
}

impl CompositionBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositionBucket::Considered => "considered",
            CompositionBucket::Scheduled => "scheduled",
            CompositionBucket::Proposed => "proposed",
            CompositionBucket::Declined => "declined",
            CompositionBucket::Included => "included",
        }
    }
}

impl FromStr for CompositionBucket {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "considered" => Ok(CompositionBucket::Considered),
            "scheduled" => Ok(CompositionBucket::Scheduled),
            "proposed" => Ok(CompositionBucket::Proposed),
            "declined" => Ok(CompositionBucket::Declined),
            "included" => Ok(CompositionBucket::Included),
            other => Err(InsightsError::ValidationError(format!(
                "Unknown composition bucket: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upgrade {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Append-only record of a composition change. `bucket == None` removes the
/// proposal from the upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeCompositionEvent {
    pub upgrade_id: i64,
    pub proposal: ProposalKey,
    pub bucket: Option<CompositionBucket>,
    pub changed_at: DateTime<Utc>,
}

/// Row of the materialized current composition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeCompositionEntry {
    pub upgrade_id: i64,
    pub proposal: ProposalKey,
    pub bucket: CompositionBucket,
    pub updated_at: DateTime<Utc>,
}
