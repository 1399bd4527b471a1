//! Model-source configuration: the allow-lists the model parser (C8) checks
//! every annotation against.

use serde::{Deserialize, Serialize};

use crate::types::collections::FxHashSet;

/// `{sources: [string], sinks: [string], features: [string], rules: [...]}`.
/// The parser rejects any kind name not present in the relevant allow-list.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Configuration {
    /// Allowed source kind names (e.g. "UserControlled").
    pub sources: Vec<String>,
    /// Allowed sink kind names (e.g. "RemoteCodeExecution").
    pub sinks: Vec<String>,
    /// Allowed `Via[...]` feature names (e.g. "string-concat").
    pub features: Vec<String>,
    /// Opaque rule identifiers the driver cross-references; the core does
    /// not interpret rule contents, only that referenced rules are declared.
    pub rules: Vec<String>,
    /// Well-known target names that get a synthetic obscure-fallback sink
    /// model instead of the generic obscure breadcrumb (C14).
    #[serde(default)]
    pub well_known_sinks: Vec<String>,
}

impl Configuration {
    /// Load a `Configuration` from a TOML document, for standalone tooling
    /// that keeps its allow-lists on disk rather than constructing the
    /// struct in-process.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn source_set(&self) -> FxHashSet<&str> {
        self.sources.iter().map(String::as_str).collect()
    }

    pub fn sink_set(&self) -> FxHashSet<&str> {
        self.sinks.iter().map(String::as_str).collect()
    }

    pub fn feature_set(&self) -> FxHashSet<&str> {
        self.features.iter().map(String::as_str).collect()
    }

    pub fn is_known_source(&self, kind: &str) -> bool {
        self.sources.iter().any(|s| s == kind)
    }

    pub fn is_known_sink(&self, kind: &str) -> bool {
        self.sinks.iter().any(|s| s == kind)
    }

    pub fn is_known_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    pub fn is_well_known_sink(&self, target: &str) -> bool {
        self.well_known_sinks.iter().any(|t| t == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_round_trip_preserves_allow_lists() {
        let toml_src = r#"
            sources = ["UserControlled"]
            sinks = ["RemoteCodeExecution", "SQLInjection"]
            features = ["string-concat"]
            rules = []
        "#;
        let config = Configuration::from_toml_str(toml_src).unwrap();
        assert!(config.is_known_source("UserControlled"));
        assert!(config.is_known_sink("SQLInjection"));
        assert!(!config.is_known_sink("Unknown"));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let config = Configuration::from_toml_str("").unwrap();
        assert!(config.sources.is_empty());
        assert!(!config.is_known_sink("anything"));
    }
}
