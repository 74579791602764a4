//! Governance bottleneck classification of open pull requests.
//!
//! Rules are evaluated in order and the first match wins. The default list
//! checks titles before labels, so a dependency bump carrying a `c-new`
//! label is still `Tooling`.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::loader::RuleSpec;
use crate::database::models::{PrState, PullRequest, Repository};
use crate::error::InsightsError;

pub const FALLBACK_CATEGORY: &str = "Other";

/// One `(predicate, label)` entry of the ordered rule list.
#[derive(Debug, Clone)]
pub struct BottleneckRule {
    pub label: String,
    title_patterns: Vec<Regex>,
    labels: Vec<String>,
}

impl BottleneckRule {
    pub fn compile(spec: &RuleSpec) -> Result<Self, InsightsError> {
        if spec.label.trim().is_empty() {
            return Err(InsightsError::ConfigError("Bottleneck rule without a label".to_string()));
        }
        if spec.title_patterns.is_empty() && spec.labels.is_empty() {
            return Err(InsightsError::ConfigError(format!(
                "Bottleneck rule '{}' has neither title patterns nor labels",
                spec.label
            )));
        }
        let title_patterns = spec
            .title_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        InsightsError::ConfigError(format!(
                            "Invalid title pattern '{}' in rule '{}': {}",
                            pattern, spec.label, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            label: spec.label.clone(),
            title_patterns,
            labels: spec.labels.iter().map(|l| l.to_ascii_lowercase()).collect(),
        })
    }

    pub fn matches(&self, title: &str, labels: &[String]) -> bool {
        self.title_patterns.iter().any(|re| re.is_match(title))
            || labels
                .iter()
                .any(|label| self.labels.contains(&label.to_ascii_lowercase()))
    }
}

/// The built-in rule list.
pub fn default_rules() -> Vec<RuleSpec> {
    let title = |label: &str, patterns: &[&str]| RuleSpec {
        label: label.to_string(),
        title_patterns: patterns.iter().map(|p| p.to_string()).collect(),
        labels: vec![],
    };
    let labelled = |label: &str, labels: &[&str]| RuleSpec {
        label: label.to_string(),
        title_patterns: vec![],
        labels: labels.iter().map(|l| l.to_string()).collect(),
    };
    vec![
        title("Typo", &[r"typo|spelling|grammar|editorial"]),
        title("Website", &[r"website|jekyll|_config"]),
        title("EIP-1", &[r"\bupdate\s+(eip|erc)[-\s]?1\b"]),
        title(
            "Tooling",
            &[r"\bbump\s+\S+\s+from\b", r"dependabot", r"^(chore|build)\(deps"],
        ),
        labelled("NEW EIP", &["c-new"]),
        labelled("Tooling", &["dependencies"]),
        labelled("Status Change", &["c-status", "c-update"]),
    ]
}

#[derive(Debug, Clone)]
pub struct BottleneckClassifier {
    rules: Vec<BottleneckRule>,
}

impl BottleneckClassifier {
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self, InsightsError> {
        let rules = specs
            .iter()
            .map(BottleneckRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Classifier over [`default_rules`].
    pub fn builtin() -> Result<Self, InsightsError> {
        Self::from_specs(&default_rules())
    }

    pub fn rules(&self) -> &[BottleneckRule] {
        &self.rules
    }

    pub fn classify(&self, title: &str, labels: &[String]) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(title, labels))
            .map(|rule| rule.label.as_str())
            .unwrap_or(FALLBACK_CATEGORY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BottleneckRow {
    pub repo: Repository,
    pub number: i64,
    pub title: String,
    pub category: String,
    pub labels: Vec<String>,
}

/// Classify every open pull request, oldest first.
pub fn classify_open(prs: &[PullRequest], classifier: &BottleneckClassifier) -> Vec<BottleneckRow> {
    let mut open: Vec<&PullRequest> = prs.iter().filter(|pr| pr.state == PrState::Open).collect();
    open.sort_by_key(|pr| (pr.created_at, pr.repo, pr.number));
    open.into_iter()
        .map(|pr| {
            let category = classifier.classify(&pr.title, &pr.labels).to_string();
            debug!("{}#{} classified as {}", pr.repo, pr.number, category);
            BottleneckRow {
                repo: pr.repo,
                number: pr.number,
                title: pr.title.clone(),
                category,
                labels: pr.labels.clone(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Open pull requests per category, largest first.
pub fn bottleneck_breakdown(rows: &[BottleneckRow]) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.category.as_str()).or_insert(0) += 1;
    }
    let mut breakdown: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect();
    breakdown.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_title_rules_take_precedence_over_labels() {
        let classifier = BottleneckClassifier::builtin().unwrap();
        assert_eq!(classifier.classify("Bump lodash from 1.0 to 1.1", &labels(&["c-new"])), "Tooling");
        assert_eq!(classifier.classify("Add EIP: Account abstraction", &labels(&["c-new"])), "NEW EIP");
        assert_eq!(classifier.classify("Fix typo in EIP-20", &labels(&["c-status"])), "Typo");
    }

    #[test]
    fn test_title_variants() {
        let classifier = BottleneckClassifier::builtin().unwrap();
        assert_eq!(classifier.classify("Update EIP-1: clarify editors", &[]), "EIP-1");
        assert_eq!(classifier.classify("update erc 1 wording", &[]), "EIP-1");
        assert_eq!(classifier.classify("Update EIP-1559: fix formula", &[]), "Other");
        assert_eq!(classifier.classify("Website: update _config.yml", &[]), "Website");
        assert_eq!(classifier.classify("chore(deps): update actions", &[]), "Tooling");
    }

    #[test]
    fn test_label_rules_and_fallback() {
        let classifier = BottleneckClassifier::builtin().unwrap();
        assert_eq!(classifier.classify("Move EIP-4844 to Final", &labels(&["c-status"])), "Status Change");
        assert_eq!(classifier.classify("Adjust rationale", &labels(&["c-update"])), "Status Change");
        assert_eq!(classifier.classify("Adjust rationale", &labels(&["Dependencies"])), "Tooling");
        assert_eq!(classifier.classify("Adjust rationale", &[]), FALLBACK_CATEGORY);
    }

    #[test]
    fn test_invalid_rules_are_config_errors() {
        let bad_regex = RuleSpec {
            label: "Broken".into(),
            title_patterns: vec!["(unclosed".into()],
            labels: vec![],
        };
        assert!(matches!(
            BottleneckClassifier::from_specs(&[bad_regex]),
            Err(InsightsError::ConfigError(_))
        ));
        let empty = RuleSpec {
            label: "Nothing".into(),
            title_patterns: vec![],
            labels: vec![],
        };
        assert!(BottleneckRule::compile(&empty).is_err());
    }

    #[test]
    fn test_every_builtin_rule_compiles() {
        for spec in default_rules() {
            assert!(BottleneckRule::compile(&spec).is_ok(), "rule {} failed to compile", spec.label);
        }
        let classifier = BottleneckClassifier::builtin().unwrap();
        let order: Vec<&str> = classifier.rules().iter().map(|r| r.label.as_str()).collect();
        let expected: Vec<String> = default_rules().into_iter().map(|r| r.label).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_breakdown_orders_by_count() {
        let row = |n: i64, category: &str| BottleneckRow {
            repo: Repository::Eips,
            number: n,
            title: String::new(),
            category: category.into(),
            labels: vec![],
        };
        let breakdown = bottleneck_breakdown(&[row(1, "Typo"), row(2, "Other"), row(3, "Other")]);
        assert_eq!(breakdown[0], CategoryCount { category: "Other".into(), count: 2 });
        assert_eq!(breakdown[1].category, "Typo");
    }
}
