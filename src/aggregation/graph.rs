//! Adjacency views: proposal dependencies and upgrade composition.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::database::models::*;
use crate::ledger::{CompositionKey, CurrentState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub key: ProposalKey,
    pub title: String,
    pub requires: Vec<ProposalKey>,
    pub required_by: Vec<ProposalKey>,
}

/// `requires` edges plus their reverse. Edges point within the same
/// repository; a required number with no stored proposal is kept as a
/// dangling edge but gets no node of its own.
pub fn dependency_graph(proposals: &[Proposal]) -> Vec<DependencyNode> {
    let mut reverse: BTreeMap<ProposalKey, BTreeSet<ProposalKey>> = BTreeMap::new();
    for proposal in proposals {
        for number in &proposal.requires {
            reverse
                .entry(ProposalKey::new(proposal.key.repo, *number))
                .or_default()
                .insert(proposal.key);
        }
    }

    let mut nodes: Vec<DependencyNode> = proposals
        .iter()
        .map(|p| {
            let requires: BTreeSet<ProposalKey> = p
                .requires
                .iter()
                .filter(|n| **n != p.key.number)
                .map(|n| ProposalKey::new(p.key.repo, *n))
                .collect();
            DependencyNode {
                key: p.key,
                title: p.title.clone(),
                requires: requires.into_iter().collect(),
                required_by: reverse
                    .get(&p.key)
                    .map(|s| s.iter().copied().filter(|k| *k != p.key).collect())
                    .unwrap_or_default(),
            }
        })
        .collect();
    nodes.sort_by_key(|n| n.key);
    nodes
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeComposition {
    pub upgrade: String,
    pub name: String,
    pub buckets: BTreeMap<CompositionBucket, Vec<ProposalKey>>,
}

/// Group the current (or replayed) composition of one upgrade by bucket.
pub fn composition_buckets(
    upgrade: &Upgrade,
    entries: impl IntoIterator<Item = (ProposalKey, CompositionBucket)>,
) -> UpgradeComposition {
    let mut buckets: BTreeMap<CompositionBucket, Vec<ProposalKey>> = BTreeMap::new();
    for (proposal, bucket) in entries {
        buckets.entry(bucket).or_default().push(proposal);
    }
    for members in buckets.values_mut() {
        members.sort();
        members.dedup();
    }
    UpgradeComposition {
        upgrade: upgrade.slug.clone(),
        name: upgrade.name.clone(),
        buckets,
    }
}

/// Members of `upgrade` in a replayed composition state.
pub fn replayed_entries(
    upgrade: &Upgrade,
    state: &CurrentState<CompositionKey, CompositionBucket>,
) -> Vec<(ProposalKey, CompositionBucket)> {
    state
        .iter()
        .filter(|(key, _)| key.upgrade_id == upgrade.id)
        .map(|(key, bucket)| (key.proposal, *bucket))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn proposal(number: i64, requires: Vec<i64>) -> Proposal {
        Proposal {
            key: ProposalKey::new(Repository::Eips, number),
            title: format!("EIP-{}", number),
            authors: vec![],
            created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            requires,
        }
    }

    #[test]
    fn test_required_by_is_the_reverse_of_requires() {
        let graph = dependency_graph(&[
            proposal(4844, vec![1559, 2718, 2930, 4895]),
            proposal(1559, vec![2718, 2930]),
            proposal(2718, vec![]),
        ]);
        let eip = |n| ProposalKey::new(Repository::Eips, n);

        assert_eq!(graph.iter().map(|n| n.key.number).collect::<Vec<_>>(), vec![1559, 2718, 4844]);
        assert_eq!(graph[1].required_by, vec![eip(1559), eip(4844)]);
        assert_eq!(graph[0].required_by, vec![eip(4844)]);
        assert_eq!(graph[2].requires.len(), 4);
    }

    #[test]
    fn test_self_reference_is_dropped() {
        let graph = dependency_graph(&[proposal(1, vec![1, 2])]);
        assert_eq!(graph[0].requires, vec![ProposalKey::new(Repository::Eips, 2)]);
        assert!(graph[0].required_by.is_empty());
    }

    #[test]
    fn test_composition_groups_by_bucket() {
        let upgrade = Upgrade {
            id: 1,
            slug: "pectra".into(),
            name: "Prague/Electra".into(),
            activated_at: None,
        };
        let eip = |n| ProposalKey::new(Repository::Eips, n);
        let composition = composition_buckets(
            &upgrade,
            vec![
                (eip(7702), CompositionBucket::Included),
                (eip(2537), CompositionBucket::Included),
                (eip(7732), CompositionBucket::Declined),
            ],
        );
        assert_eq!(composition.buckets[&CompositionBucket::Included], vec![eip(2537), eip(7702)]);
        assert_eq!(composition.buckets[&CompositionBucket::Declined].len(), 1);
        assert!(!composition.buckets.contains_key(&CompositionBucket::Scheduled));
    }
}
