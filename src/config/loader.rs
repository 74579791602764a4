//! Rule file loader.
//! Reads the ordered bottleneck rule list from YAML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::InsightsError;
use crate::scoring::bottleneck::BottleneckClassifier;

/// One rule as written in the rule file. A rule matches when any title
/// pattern (case-insensitive regex) or any label matches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleSpec {
    pub label: String,
    #[serde(default)]
    pub title_patterns: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BottleneckRulesFile {
    pub rules: Vec<RuleSpec>,
}

impl BottleneckRulesFile {
    pub fn load(path: &Path) -> Result<Self, InsightsError> {
        info!("Loading bottleneck rules from: {:?}", path);

        if !path.exists() {
            return Err(InsightsError::ConfigError(format!(
                "Rule file not found: {:?}",
                path
            )));
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            InsightsError::ConfigError(format!("Failed to read {:?}: {}", path, e))
        })?;

        Self::parse(&contents)
            .map_err(|e| InsightsError::ConfigError(format!("Failed to parse {:?}: {}", path, e)))
    }

    pub fn parse(contents: &str) -> Result<Self, InsightsError> {
        let file: BottleneckRulesFile = serde_yaml::from_str(contents)
            .map_err(|e| InsightsError::ConfigError(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), InsightsError> {
        if self.rules.is_empty() {
            return Err(InsightsError::ConfigError(
                "No bottleneck rules defined".to_string(),
            ));
        }
        Ok(())
    }

    /// Compile into a classifier, keeping file order as priority order.
    pub fn into_classifier(self) -> Result<BottleneckClassifier, InsightsError> {
        let classifier = BottleneckClassifier::from_specs(&self.rules)?;
        info!("Compiled {} bottleneck rules", classifier.rules().len());
        Ok(classifier)
    }
}

/// The configured classifier, or the built-in rules when no file is set.
pub fn load_classifier(path: Option<&Path>) -> Result<BottleneckClassifier, InsightsError> {
    match path {
        Some(path) => BottleneckRulesFile::load(path)?.into_classifier(),
        None => BottleneckClassifier::builtin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RULES: &str = r#"
rules:
  - label: Security
    title_patterns: ["\\bsecurity\\b", "vulnerab"]
  - label: NEW EIP
    labels: [c-new]
"#;

    #[test]
    fn test_rules_keep_file_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RULES.as_bytes()).unwrap();

        let classifier = load_classifier(Some(file.path())).unwrap();
        assert_eq!(classifier.rules().len(), 2);
        let labels = vec!["c-new".to_string()];
        assert_eq!(classifier.classify("Security considerations", &labels), "Security");
        assert_eq!(classifier.classify("Add EIP", &labels), "NEW EIP");
        assert_eq!(classifier.classify("Bump lodash from 1.0 to 1.1", &[]), "Other");
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let file = BottleneckRulesFile::parse("rules:\n  - label: Broken\n    title_patterns: [\"[a-\"]\n").unwrap();
        assert!(matches!(file.into_classifier(), Err(InsightsError::ConfigError(_))));
    }

    #[test]
    fn test_empty_and_missing_files_are_rejected() {
        assert!(BottleneckRulesFile::parse("rules: []\n").is_err());
        assert!(load_classifier(Some(Path::new("/nonexistent/rules.yml"))).is_err());
        assert!(load_classifier(None).is_ok());
    }
}
