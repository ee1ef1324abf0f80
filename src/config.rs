//! Run configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::ApiOverrides;
use crate::detect::{RuleId, Severity};

/// A config that parsed but makes no sense.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid YAML: {0}")]
    Yaml(String),
    #[error("taint_depth must be at least 1")]
    ZeroTaintDepth,
    #[error("invalid excluded path pattern {pattern:?}: {reason}")]
    BadGlob { pattern: String, reason: String },
    #[error("body_fields must not be empty")]
    NoBodyFields,
}

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Hops the taint tracer follows from a header write back to its source.
    pub taint_depth: usize,
    /// Rules to run; empty means all.
    pub enabled_rules: Vec<String>,
    /// Per-rule severity replacing the built-in one.
    pub severity_overrides: BTreeMap<String, Severity>,
    /// Severity at or above which a report counts as failing.
    pub fail_on: Option<Severity>,
    /// Additions to the built-in library tables.
    pub known_apis: ApiOverrides,
    /// Field names that hold a request or response body.
    pub body_fields: Vec<String>,
    /// Response headers that must not echo request headers.
    pub reflected_header_names: Vec<String>,
    /// Directory names never descended into.
    pub ignore_dirs: Vec<String>,
    pub max_file_bytes: u64,
    /// Whether `*_test.go` files are analyzed.
    pub include_tests: bool,
    /// Glob patterns for paths to exclude (e.g. "**/generated/**").
    pub excluded_paths: Vec<String>,
    pub max_files: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            taint_depth: 3,
            enabled_rules: Vec::new(),
            severity_overrides: BTreeMap::new(),
            fail_on: None,
            known_apis: ApiOverrides::default(),
            body_fields: vec!["Body".to_string()],
            reflected_header_names: vec!["Access-Control-Allow-Origin".to_string()],
            ignore_dirs: [".git", "node_modules", "vendor", "dist", "build", "target", "testdata"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_bytes: 1_000_000,
            include_tests: false,
            excluded_paths: Vec::new(),
            max_files: 50_000,
        }
    }
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(Self::from_yaml_str(&content)?)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a map.
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::Yaml(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.taint_depth == 0 {
            return Err(ConfigError::ZeroTaintDepth);
        }
        if self.body_fields.is_empty() {
            return Err(ConfigError::NoBodyFields);
        }
        for pattern in &self.excluded_paths {
            globset::Glob::new(pattern).map_err(|e| ConfigError::BadGlob {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn is_rule_enabled(&self, rule: &RuleId) -> bool {
        self.enabled_rules.is_empty() || self.enabled_rules.iter().any(|r| r == rule.as_str())
    }

    /// The configured severity for `rule`, or `default` when not overridden.
    pub fn severity_for(&self, rule: &RuleId, default: Severity) -> Severity {
        self.severity_overrides
            .get(rule.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Check if a path should be excluded based on excluded_paths patterns.
    /// Uses globset for matching, which supports `**` for recursive directory matching.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }

        let path_str = path.to_string_lossy().replace('\\', "/");

        self.excluded_paths.iter().any(|pattern| {
            globset::Glob::new(pattern)
                .map(|glob| glob.compile_matcher().is_match(&path_str))
                .unwrap_or(false)
        })
    }
}
