//! Append-only event logs and the keyed current-state caches derived from them.
//!
//! A log is the source of truth. A [`CurrentState`] is rebuilt from it with
//! [`EventLog::replay`]; historical ("as of") questions are answered from the
//! log, never from a stored cache.

pub mod consistency;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::database::models::*;
use crate::error::InsightsError;

/// An event that folds into a per-key current state.
pub trait LogEvent {
    type Key: Ord + Clone + std::fmt::Debug + std::fmt::Display;
    type State: Clone;

    fn key(&self) -> Self::Key;
    fn at(&self) -> DateTime<Utc>;

    /// New state for the key after this event; `None` removes the key.
    fn apply(&self, current: Option<&Self::State>) -> Option<Self::State>;
}

/// Insert-only log, ordered by time within each key.
#[derive(Debug, Clone)]
pub struct EventLog<E: LogEvent> {
    events: Vec<E>,
    latest: BTreeMap<E::Key, DateTime<Utc>>,
}

impl<E: LogEvent> Default for EventLog<E> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            latest: BTreeMap::new(),
        }
    }
}

impl<E: LogEvent> EventLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from events already in storage order.
    pub fn from_events(events: impl IntoIterator<Item = E>) -> Result<Self, InsightsError> {
        let mut log = Self::new();
        for event in events {
            log.append(event)?;
        }
        Ok(log)
    }

    /// Build a log from events in write order, setting aside any event that
    /// goes back in time for its key. Each rejected event is returned with the
    /// key's latest timestamp at that point.
    pub fn from_written(events: impl IntoIterator<Item = E>) -> (Self, Vec<(E, DateTime<Utc>)>) {
        let mut log = Self::new();
        let mut rejected = Vec::new();
        for event in events {
            match log.latest.get(&event.key()) {
                Some(latest) if event.at() < *latest => {
                    let latest = *latest;
                    rejected.push((event, latest));
                }
                _ => {
                    log.latest.insert(event.key(), event.at());
                    log.events.push(event);
                }
            }
        }
        (log, rejected)
    }

    /// Appends must not go back in time for their key. Equal timestamps keep
    /// insertion order.
    pub fn append(&mut self, event: E) -> Result<(), InsightsError> {
        let key = event.key();
        let at = event.at();
        if let Some(latest) = self.latest.get(&key) {
            if at < *latest {
                return Err(InsightsError::ValidationError(format!(
                    "Out-of-order event for {}: {} is before {}",
                    key, at, latest
                )));
            }
        }
        self.latest.insert(key, at);
        self.events.push(event);
        Ok(())
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of one key, oldest first.
    pub fn history(&self, key: &E::Key) -> Vec<&E> {
        self.events.iter().filter(|e| e.key() == *key).collect()
    }

    /// Fold the log into current state. With `as_of`, only events strictly
    /// before that instant are applied.
    pub fn replay(&self, as_of: Option<DateTime<Utc>>) -> CurrentState<E::Key, E::State> {
        let mut state = CurrentState::new();
        for event in &self.events {
            if as_of.map_or(false, |cutoff| event.at() >= cutoff) {
                continue;
            }
            let key = event.key();
            match event.apply(state.get(&key)) {
                Some(next) => state.upsert(key, next),
                None => state.remove(&key),
            }
        }
        state
    }
}

/// Upsert-only keyed cache with exactly one row per key.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentState<K: Ord, V> {
    rows: BTreeMap<K, V>,
}

impl<K: Ord, V> Default for CurrentState<K, V> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<K: Ord, V> CurrentState<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, key: K, value: V) {
        self.rows.insert(key, value);
    }

    pub fn remove(&mut self, key: &K) {
        self.rows.remove(key);
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.rows.iter()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for CurrentState<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl LogEvent for StatusEvent {
    type Key = ProposalKey;
    type State = String;

    fn key(&self) -> ProposalKey {
        self.key
    }

    fn at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    // Any observed transition is history, including ones a strict lifecycle
    // would forbid (e.g. Stagnant -> Draft).
    fn apply(&self, _current: Option<&String>) -> Option<String> {
        Some(self.to_status.clone())
    }
}

impl LogEvent for CategoryEvent {
    type Key = ProposalKey;
    type State = String;

    fn key(&self) -> ProposalKey {
        self.key
    }

    fn at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    fn apply(&self, _current: Option<&String>) -> Option<String> {
        Some(self.to_category.clone())
    }
}

impl LogEvent for DeadlineEvent {
    type Key = ProposalKey;
    type State = DateTime<Utc>;

    fn key(&self) -> ProposalKey {
        self.key
    }

    fn at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    fn apply(&self, _current: Option<&DateTime<Utc>>) -> Option<DateTime<Utc>> {
        self.to_deadline
    }
}

/// Composition rows are keyed by `(upgrade_id, proposal)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositionKey {
    pub upgrade_id: i64,
    pub proposal: ProposalKey,
}

impl std::fmt::Display for CompositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upgrade {} / {}", self.upgrade_id, self.proposal)
    }
}

impl LogEvent for UpgradeCompositionEvent {
    type Key = CompositionKey;
    type State = CompositionBucket;

    fn key(&self) -> CompositionKey {
        CompositionKey {
            upgrade_id: self.upgrade_id,
            proposal: self.proposal,
        }
    }

    fn at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    fn apply(&self, _current: Option<&CompositionBucket>) -> Option<CompositionBucket> {
        self.bucket
    }
}
