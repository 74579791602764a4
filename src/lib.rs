pub mod aggregation;
pub mod config;
pub mod database;
pub mod error;
pub mod filters;
pub mod ledger;
pub mod scoring;
pub mod service;

pub use error::InsightsError;
pub use service::AnalyticsService;
