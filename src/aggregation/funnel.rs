use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::database::models::{ProposalSnapshot, ProposalStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub status: String,
    pub count: u64,
}

/// Proposals per current status in canonical lifecycle order. Spelling
/// variants share a stage; unrecognized statuses land in a trailing
/// `Other` stage. Stages with no proposals are omitted.
pub fn lifecycle_funnel(snapshots: &[ProposalSnapshot]) -> Vec<FunnelStage> {
    funnel_of(snapshots.iter().map(|s| s.status.as_str()))
}

/// Same staging for any set of status labels, e.g. a replayed log.
pub fn funnel_of<'a>(statuses: impl IntoIterator<Item = &'a str>) -> Vec<FunnelStage> {
    let mut counts: BTreeMap<usize, u64> = BTreeMap::new();
    for status in statuses {
        *counts.entry(ProposalStatus::rank_of(status)).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(rank, count)| FunnelStage {
            status: ProposalStatus::CANONICAL_ORDER
                .get(rank)
                .map(|s| s.label())
                .unwrap_or(ProposalStatus::FALLBACK_LABEL)
                .to_string(),
            count,
        })
        .collect()
}
