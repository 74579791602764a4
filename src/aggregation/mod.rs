//! Aggregation engine: grouped counts, percentile durations and dense
//! monthly trends computed over event-store reads.

pub mod crosstab;
pub mod funnel;
pub mod graph;
pub mod leaderboard;
pub mod percentile;
pub mod snapshot;
pub mod trend;
pub mod velocity;

pub use crosstab::{category_status_matrix, CrossTab};
pub use funnel::{funnel_of, lifecycle_funnel, FunnelStage};
pub use percentile::{median, percentile_cont, DurationSummary};
pub use snapshot::{status_snapshot, StatusSnapshotRow};
pub use trend::{MonthKey, MonthRange};
