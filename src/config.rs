pub mod loader;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::aggregation::velocity::TransitionPair;
use crate::error::InsightsError;

/// Default page sizes per view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewLimits {
    pub trending: usize,
    pub leaderboard: usize,
    pub bottlenecks: usize,
    pub timeline: usize,
}

impl Default for ViewLimits {
    fn default() -> Self {
        Self {
            trending: 20,
            leaderboard: 50,
            bottlenecks: 50,
            timeline: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub log_filter: String,
    pub trending_window_days: i64,
    pub view_limits: ViewLimits,
    pub velocity_pairs: Vec<TransitionPair>,
    /// YAML bottleneck rule list replacing the built-in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottleneck_rules_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://eip-insights.db?mode=rwc".to_string(),
            max_connections: 5,
            log_filter: "eip_insights=info".to_string(),
            trending_window_days: 7,
            view_limits: ViewLimits::default(),
            velocity_pairs: TransitionPair::defaults(),
            bottleneck_rules_path: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then the optional file, then `EIP_INSIGHTS_*` variables
    /// (`__` separates nested keys, e.g. `EIP_INSIGHTS_VIEW_LIMITS__TRENDING`).
    pub fn load(path: Option<&Path>) -> Result<Self, InsightsError> {
        let defaults = serde_json::to_string(&AppConfig::default())
            .map_err(|e| InsightsError::ConfigError(format!("Failed to encode defaults: {}", e)))?;
        let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));

        if let Some(path) = path {
            if !path.exists() {
                return Err(InsightsError::ConfigError(format!(
                    "Configuration file not found: {:?}",
                    path
                )));
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("EIP_INSIGHTS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| InsightsError::ConfigError(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InsightsError> {
        if self.max_connections == 0 {
            return Err(InsightsError::ConfigError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.trending_window_days <= 0 {
            return Err(InsightsError::ConfigError(format!(
                "trending_window_days ({}) must be positive",
                self.trending_window_days
            )));
        }
        let limits = &self.view_limits;
        if [limits.trending, limits.leaderboard, limits.bottlenecks, limits.timeline].contains(&0) {
            return Err(InsightsError::ConfigError(
                "view limits must be positive".to_string(),
            ));
        }
        if self.velocity_pairs.is_empty() {
            return Err(InsightsError::ConfigError(
                "No velocity pairs configured".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.view_limits.trending, 20);
        assert_eq!(config.velocity_pairs.len(), 4);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "database_url: \"sqlite::memory:\"\ntrending_window_days: 14\nview_limits:\n  trending: 5\n  leaderboard: 50\n  bottlenecks: 50\n  timeline: 50"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.trending_window_days, 14);
        assert_eq!(config.view_limits.trending, 5);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/eip-insights.yaml")));
        assert!(matches!(result, Err(InsightsError::ConfigError(_))));
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let mut config = AppConfig::default();
        config.view_limits.leaderboard = 0;
        assert!(config.validate().is_err());
    }
}
