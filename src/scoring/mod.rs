//! Scoring engine: trending score, bottleneck classification and
//! waiting-duration buckets.

pub mod bottleneck;
pub mod trending;
pub mod waiting;

pub use bottleneck::{BottleneckClassifier, BottleneckRow, CategoryCount};
pub use trending::TrendingRow;
pub use waiting::{WaitingBucket, WaitingHeatmap, WaitingRow};
