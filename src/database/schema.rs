// Database schema for the governance event store.
// Event tables are append-only; *_snapshots, governance_states and
// upgrade_composition_current are materialized current-state caches.

pub const INITIAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS proposals (
    repo        TEXT    NOT NULL,
    number      INTEGER NOT NULL,
    title       TEXT    NOT NULL,
    authors     TEXT    NOT NULL DEFAULT '[]',
    created_at  TEXT    NOT NULL,
    requires    TEXT    NOT NULL DEFAULT '[]',
    PRIMARY KEY (repo, number)
);

CREATE TABLE IF NOT EXISTS proposal_snapshots (
    repo          TEXT    NOT NULL,
    number        INTEGER NOT NULL,
    status        TEXT    NOT NULL,
    proposal_type TEXT,
    category      TEXT,
    deadline      TEXT,
    updated_at    TEXT    NOT NULL,
    PRIMARY KEY (repo, number)
);

CREATE TABLE IF NOT EXISTS status_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    repo        TEXT    NOT NULL,
    number      INTEGER NOT NULL,
    from_status TEXT,
    to_status   TEXT    NOT NULL,
    changed_at  TEXT    NOT NULL,
    commit_sha  TEXT,
    pr_number   INTEGER
);
CREATE INDEX IF NOT EXISTS idx_status_events_proposal ON status_events (repo, number, changed_at);
CREATE INDEX IF NOT EXISTS idx_status_events_time ON status_events (changed_at);

CREATE TABLE IF NOT EXISTS category_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    repo          TEXT    NOT NULL,
    number        INTEGER NOT NULL,
    from_category TEXT,
    to_category   TEXT    NOT NULL,
    changed_at    TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_category_events_proposal ON category_events (repo, number, changed_at);

CREATE TABLE IF NOT EXISTS deadline_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    repo          TEXT    NOT NULL,
    number        INTEGER NOT NULL,
    from_deadline TEXT,
    to_deadline   TEXT,
    changed_at    TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deadline_events_proposal ON deadline_events (repo, number, changed_at);

CREATE TABLE IF NOT EXISTS pull_requests (
    repo          TEXT    NOT NULL,
    number        INTEGER NOT NULL,
    title         TEXT    NOT NULL,
    author        TEXT    NOT NULL,
    state         TEXT    NOT NULL,
    created_at    TEXT    NOT NULL,
    merged_at     TEXT,
    closed_at     TEXT,
    comment_count INTEGER NOT NULL DEFAULT 0,
    review_count  INTEGER NOT NULL DEFAULT 0,
    commit_count  INTEGER NOT NULL DEFAULT 0,
    file_count    INTEGER NOT NULL DEFAULT 0,
    labels        TEXT    NOT NULL DEFAULT '[]',
    PRIMARY KEY (repo, number)
);

CREATE TABLE IF NOT EXISTS pull_request_proposals (
    pr_repo         TEXT    NOT NULL,
    pr_number       INTEGER NOT NULL,
    proposal_repo   TEXT    NOT NULL,
    proposal_number INTEGER NOT NULL,
    PRIMARY KEY (pr_repo, pr_number, proposal_repo, proposal_number)
);

CREATE TABLE IF NOT EXISTS governance_states (
    repo          TEXT    NOT NULL,
    pr_number     INTEGER NOT NULL,
    state         TEXT    NOT NULL,
    waiting_since TEXT    NOT NULL,
    updated_at    TEXT    NOT NULL,
    PRIMARY KEY (repo, pr_number)
);

CREATE TABLE IF NOT EXISTS contributor_activity (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    repo        TEXT    NOT NULL,
    actor       TEXT    NOT NULL,
    role        TEXT    NOT NULL,
    action      TEXT    NOT NULL,
    pr_number   INTEGER,
    occurred_at TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_contributor_activity_time ON contributor_activity (occurred_at);

CREATE TABLE IF NOT EXISTS upgrades (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    slug         TEXT    NOT NULL UNIQUE,
    name         TEXT    NOT NULL,
    activated_at TEXT
);

CREATE TABLE IF NOT EXISTS upgrade_composition_events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    upgrade_id      INTEGER NOT NULL,
    proposal_repo   TEXT    NOT NULL,
    proposal_number INTEGER NOT NULL,
    bucket          TEXT,
    changed_at      TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_composition_events_upgrade ON upgrade_composition_events (upgrade_id, changed_at);

CREATE TABLE IF NOT EXISTS upgrade_composition_current (
    upgrade_id      INTEGER NOT NULL,
    proposal_repo   TEXT    NOT NULL,
    proposal_number INTEGER NOT NULL,
    bucket          TEXT    NOT NULL,
    updated_at      TEXT    NOT NULL,
    PRIMARY KEY (upgrade_id, proposal_repo, proposal_number)
);
"#;
