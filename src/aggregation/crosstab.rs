//! Category x status matrix with totals computed from the cells.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::database::models::{ProposalSnapshot, ProposalStatus};

/// Row label for proposals without a category (Meta, Informational).
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTab {
    /// Category labels, sorted.
    pub rows: Vec<String>,
    /// Status labels in canonical lifecycle order.
    pub columns: Vec<String>,
    /// `cells[row][column]`.
    pub cells: Vec<Vec<u64>>,
    pub row_totals: Vec<u64>,
    pub column_totals: Vec<u64>,
    pub grand_total: u64,
}

impl CrossTab {
    /// Every total equals the sum of the cells it covers.
    pub fn reconciles(&self) -> bool {
        let rows_ok = self
            .cells
            .iter()
            .zip(&self.row_totals)
            .all(|(row, total)| row.iter().sum::<u64>() == *total);
        let columns_ok = self.column_totals.iter().enumerate().all(|(c, total)| {
            self.cells.iter().map(|row| row[c]).sum::<u64>() == *total
        });
        let grand_ok = self.cells.iter().flatten().sum::<u64>() == self.grand_total
            && self.row_totals.iter().sum::<u64>() == self.grand_total
            && self.column_totals.iter().sum::<u64>() == self.grand_total;
        rows_ok && columns_ok && grand_ok
    }

    pub fn cell(&self, category: &str, status: &str) -> Option<u64> {
        let r = self.rows.iter().position(|c| c == category)?;
        let c = self.columns.iter().position(|s| s == status)?;
        Some(self.cells[r][c])
    }
}

/// Two-key grouped count of snapshots by `(category, status)`. Status
/// variants are folded onto canonical labels.
pub fn category_status_matrix(snapshots: &[ProposalSnapshot]) -> CrossTab {
    let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
    let mut rows: BTreeSet<String> = BTreeSet::new();
    let mut columns: BTreeSet<(usize, String)> = BTreeSet::new();

    for snapshot in snapshots {
        let category = snapshot
            .category
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        let status = ProposalStatus::bucket_label(&snapshot.status).to_string();

        rows.insert(category.clone());
        columns.insert((ProposalStatus::rank_of(&snapshot.status), status.clone()));
        *counts.entry((category, status)).or_insert(0) += 1;
    }

    let rows: Vec<String> = rows.into_iter().collect();
    let columns: Vec<String> = columns.into_iter().map(|(_, label)| label).collect();

    let cells: Vec<Vec<u64>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| counts.get(&(row.clone(), column.clone())).copied().unwrap_or(0))
                .collect()
        })
        .collect();

    let row_totals: Vec<u64> = cells.iter().map(|row| row.iter().sum()).collect();
    let column_totals: Vec<u64> = (0..columns.len())
        .map(|c| cells.iter().map(|row| row[c]).sum())
        .collect();
    let grand_total = row_totals.iter().sum();

    CrossTab {
        rows,
        columns,
        cells,
        row_totals,
        column_totals,
        grand_total,
    }
}
