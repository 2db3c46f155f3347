use crate::rules::{self, RangeRule};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

fn default_enabled() -> bool {
    true
}

fn default_param_type() -> String {
    "java.lang.String".to_string()
}

/// One configured inline marker: a SQL template plus an ordered rule list.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerConfig {
    pub name: String,
    pub template: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<RangeRule>,
}

/// Identifies a call whose argument carries a feature name. The host's
/// resolver uses the parameter index/type to extract the name; here the
/// signature selects which call expressions are worth evaluating.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureEvaluatorConfig {
    pub method_signature: String,
    #[serde(default)]
    pub param_index: usize,
    #[serde(default = "default_param_type")]
    pub param_type: String,
}

/// Immutable settings snapshot for one evaluation pass.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkerSettings {
    #[serde(default)]
    pub markers: Vec<MarkerConfig>,
    #[serde(default)]
    pub feature_evaluators: Vec<FeatureEvaluatorConfig>,
}

impl MarkerSettings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("parse marker settings")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn enabled_markers(&self) -> impl Iterator<Item = &MarkerConfig> {
        self.markers.iter().filter(|config| config.enabled)
    }

    pub fn has_feature_evaluator(&self, signature: &str) -> bool {
        self.feature_evaluators
            .iter()
            .any(|evaluator| evaluator.method_signature == signature)
    }

    /// Eagerly check every rule of every marker with the same parsers the
    /// evaluator uses. Returns one human-readable line per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for config in &self.markers {
            for (idx, rule) in config.rules.iter().enumerate() {
                if let Err(err) = rules::parse_boundary(&rule.from, true) {
                    problems.push(format!("{}: rule {}: {err}", config.name, idx + 1));
                }
                if let Err(err) = rules::parse_boundary(&rule.to, false) {
                    problems.push(format!("{}: rule {}: {err}", config.name, idx + 1));
                }
                if !rule.color.trim().is_empty() {
                    if let Err(err) = rules::parse_color(&rule.color) {
                        problems.push(format!("{}: rule {}: {err}", config.name, idx + 1));
                    }
                }
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
markers:
  - name: call count
    template: "SELECT count(*) FROM calls WHERE method = '#method_fqn#'"
    rules:
      - { from: "50", to: "", color: "#FF0000" }
      - { from: "", to: "50", color: "#00FF00" }
  - name: disabled one
    template: "SELECT 1"
    enabled: false
feature_evaluators:
  - method_signature: "com.acme.Flags.isEnabled(java.lang.String)"
    param_index: 0
"##;

    #[test]
    fn parses_yaml_settings() {
        let settings = MarkerSettings::from_yaml(SAMPLE).unwrap();
        assert_eq!(settings.markers.len(), 2);
        assert_eq!(settings.enabled_markers().count(), 1);
        assert!(settings.has_feature_evaluator("com.acme.Flags.isEnabled(java.lang.String)"));
        assert!(!settings.has_feature_evaluator("com.acme.Other.call()"));
        assert_eq!(settings.feature_evaluators[0].param_type, "java.lang.String");
    }

    #[test]
    fn validate_reports_bad_boundaries_and_colors() {
        let settings = MarkerSettings::from_yaml(
            r##"
markers:
  - name: broken
    template: "SELECT 1"
    rules:
      - { from: "abc", to: "10", color: "#FF0000" }
      - { from: "0", to: "10", color: "nope" }
"##,
        )
        .unwrap();
        let problems = settings.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("invalid rule boundary"));
        assert!(problems[1].contains("invalid color"));
    }

    #[test]
    fn validate_accepts_blank_colors() {
        let settings = MarkerSettings::from_yaml(
            r#"
markers:
  - name: suppressing
    template: "SELECT 1"
    rules:
      - { from: "", to: "0", color: "" }
"#,
        )
        .unwrap();
        assert!(settings.validate().is_empty());
    }
}
