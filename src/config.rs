//! Configuration for Baler
//!
//! This module provides configuration options for the frame registry and the
//! capacity rules that size frames per stream.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default frame capacity in bytes, header included
pub const DEFAULT_FRAME_CAPACITY: usize = 64 * 1024;

/// Smallest frame capacity the configuration accepts
pub const MIN_FRAME_CAPACITY: usize = 64;

/// One ordered capacity rule: streams whose file path matches `pattern` get
/// frames of `capacity` bytes.
///
/// Patterns are regular expressions matched anywhere in the path; anchor
/// explicitly when a full-path match is intended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRule {
    /// Rule name, for diagnostics and configuration files
    pub name: String,
    /// Pattern tested against the stream's file path
    pub pattern: String,
    /// Frame capacity in bytes for matching streams
    pub capacity: usize,
}

impl CapacityRule {
    /// Create a new capacity rule
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            capacity,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: CapacityRule,
    pattern: Regex,
}

/// Ordered capacity rules with an unconditional default fallback.
///
/// The first rule (in declaration order) whose pattern matches a stream's
/// file path decides that stream's frame capacity; streams matching no rule
/// get the default.
#[derive(Debug, Clone)]
pub struct CapacityTable {
    rules: Vec<CompiledRule>,
    default_capacity: usize,
}

impl CapacityTable {
    /// Create a table with no rules; every stream gets the default capacity
    pub fn uniform(default_capacity: usize) -> Self {
        Self {
            rules: Vec::new(),
            default_capacity,
        }
    }

    /// Create a table from ordered rules plus the default fallback.
    ///
    /// Fails if any rule pattern is not a valid regular expression.
    pub fn with_rules(rules: Vec<CapacityRule>, default_capacity: usize) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let pattern = Regex::new(&rule.pattern).map_err(|err| {
                Error::config(format!(
                    "capacity rule '{}': invalid pattern '{}': {}",
                    rule.name, rule.pattern, err
                ))
            })?;
            compiled.push(CompiledRule { rule, pattern });
        }
        Ok(Self {
            rules: compiled,
            default_capacity,
        })
    }

    /// Resolve the frame capacity for a stream's file path
    pub fn resolve(&self, file_path: &str) -> usize {
        for compiled in &self.rules {
            if compiled.pattern.is_match(file_path) {
                return compiled.rule.capacity;
            }
        }
        self.default_capacity
    }

    /// The fallback capacity for paths matching no rule
    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// Number of configured rules, the default excluded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Configuration options for a frame registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RegistryConfig {
    // Storage configuration
    /// Directory that holds persisted frames and the registry lock file
    pub durable_dir: PathBuf,

    // Capacity configuration
    /// Frame capacity in bytes for streams matching no rule
    pub default_capacity: usize,
    /// Ordered capacity rules; first match wins
    pub capacity_rules: Vec<CapacityRule>,

    // Reliability settings
    /// Whether to fsync each persisted frame and the durable directory
    pub sync_writes: bool,
    /// Whether to verify frame checksums on reload
    pub verify_checksums: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            // Storage configuration
            durable_dir: PathBuf::from("baler-data"),

            // Capacity configuration
            default_capacity: DEFAULT_FRAME_CAPACITY,
            capacity_rules: Vec::new(),

            // Reliability settings
            sync_writes: true,
            verify_checksums: true,
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with default values and the given durable directory
    pub fn new<P: AsRef<Path>>(durable_dir: P) -> Self {
        Self {
            durable_dir: durable_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Set the durable directory
    pub fn with_durable_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.durable_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the default frame capacity in bytes
    pub fn with_default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }

    /// Append one capacity rule
    pub fn with_capacity_rule(
        mut self,
        name: impl Into<String>,
        pattern: impl Into<String>,
        capacity: usize,
    ) -> Self {
        self.capacity_rules
            .push(CapacityRule::new(name, pattern, capacity));
        self
    }

    /// Replace the capacity rule list
    pub fn with_capacity_rules(mut self, rules: Vec<CapacityRule>) -> Self {
        self.capacity_rules = rules;
        self
    }

    /// Set whether to fsync persisted frames
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Set whether to verify frame checksums on reload
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.durable_dir.as_os_str().is_empty() {
            return Err(Error::config("Durable directory must not be empty"));
        }

        if self.default_capacity < MIN_FRAME_CAPACITY {
            return Err(Error::config(format!(
                "Default frame capacity must be at least {} bytes",
                MIN_FRAME_CAPACITY
            )));
        }

        for rule in &self.capacity_rules {
            if rule.name.is_empty() {
                return Err(Error::config("Capacity rule names must not be empty"));
            }
            if rule.capacity < MIN_FRAME_CAPACITY {
                return Err(Error::config(format!(
                    "Capacity rule '{}' must allow at least {} bytes",
                    rule.name, MIN_FRAME_CAPACITY
                )));
            }
            if let Err(err) = Regex::new(&rule.pattern) {
                return Err(Error::config(format!(
                    "Capacity rule '{}': invalid pattern '{}': {}",
                    rule.name, rule.pattern, err
                )));
            }
        }

        Ok(())
    }

    /// Compile the capacity rules into a resolution table
    pub fn capacity_table(&self) -> Result<CapacityTable> {
        CapacityTable::with_rules(self.capacity_rules.clone(), self.default_capacity)
    }

    /// Create a human-readable string representation of the configuration
    pub fn to_string_pretty(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Baler Configuration ===\n\n");

        result.push_str("Storage Configuration:\n");
        result.push_str(&format!("  Durable Directory: {:?}\n", self.durable_dir));

        result.push_str("\nCapacity Configuration:\n");
        result.push_str(&format!(
            "  Default Capacity: {} bytes\n",
            self.default_capacity
        ));
        for rule in &self.capacity_rules {
            result.push_str(&format!(
                "  Rule '{}': {} -> {} bytes\n",
                rule.name, rule.pattern, rule.capacity
            ));
        }

        result.push_str("\nReliability Settings:\n");
        result.push_str(&format!("  Sync Writes: {}\n", self.sync_writes));
        result.push_str(&format!(
            "  Verify Checksums: {}\n",
            self.verify_checksums
        ));

        result
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        // Check default values
        assert_eq!(config.durable_dir, PathBuf::from("baler-data"));
        assert_eq!(config.default_capacity, DEFAULT_FRAME_CAPACITY);
        assert!(config.capacity_rules.is_empty());
        assert_eq!(config.sync_writes, true);
        assert_eq!(config.verify_checksums, true);

        // Validate the default config
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RegistryConfig::new("/tmp/frames")
            .with_default_capacity(32 * 1024)
            .with_capacity_rule("access", r"access\.log$", 128 * 1024)
            .with_capacity_rule("audit", r"/audit/", 8 * 1024)
            .with_sync_writes(false)
            .with_verify_checksums(false);

        assert_eq!(config.durable_dir, PathBuf::from("/tmp/frames"));
        assert_eq!(config.default_capacity, 32 * 1024);
        assert_eq!(config.capacity_rules.len(), 2);
        assert_eq!(config.capacity_rules[0].name, "access");
        assert_eq!(config.sync_writes, false);
        assert_eq!(config.verify_checksums, false);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid_configs = vec![
            RegistryConfig::new(""),
            RegistryConfig::new("/tmp/frames").with_default_capacity(0),
            RegistryConfig::new("/tmp/frames").with_default_capacity(MIN_FRAME_CAPACITY - 1),
            RegistryConfig::new("/tmp/frames").with_capacity_rule("", "a", 1024),
            RegistryConfig::new("/tmp/frames").with_capacity_rule("tiny", "a", 16),
            RegistryConfig::new("/tmp/frames").with_capacity_rule("broken", "(", 1024),
        ];

        for config in invalid_configs {
            assert!(config.validate().is_err(), "accepted: {:?}", config);
        }
    }

    #[test]
    fn test_capacity_resolution_order() {
        let table = CapacityTable::with_rules(
            vec![
                CapacityRule::new("first", r"app\.log$", 1024),
                CapacityRule::new("shadowed", r"app", 2048),
                CapacityRule::new("audit", r"^/audit/", 4096),
            ],
            512,
        )
        .unwrap();

        // First matching rule wins, in declaration order
        assert_eq!(table.resolve("/var/log/app.log"), 1024);
        assert_eq!(table.resolve("/var/log/app.err"), 2048);
        assert_eq!(table.resolve("/audit/events.log"), 4096);

        // No rule matches: default fallback
        assert_eq!(table.resolve("/var/log/other.log"), 512);
        assert_eq!(table.default_capacity(), 512);
        assert_eq!(table.rule_count(), 3);
    }

    #[test]
    fn test_uniform_table() {
        let table = CapacityTable::uniform(8192);
        assert_eq!(table.resolve("/any/path"), 8192);
        assert_eq!(table.rule_count(), 0);
    }

    #[test]
    fn test_invalid_rule_pattern() {
        let result = CapacityTable::with_rules(vec![CapacityRule::new("bad", "(", 1024)], 512);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let config = RegistryConfig::new("/tmp/frames")
            .with_default_capacity(32 * 1024)
            .with_capacity_rule("access", r"access\.log$", 128 * 1024);
        config.to_json_file(&path).unwrap();

        let loaded = RegistryConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.durable_dir, config.durable_dir);
        assert_eq!(loaded.default_capacity, config.default_capacity);
        assert_eq!(loaded.capacity_rules, config.capacity_rules);
        assert_eq!(loaded.sync_writes, config.sync_writes);
    }

    #[test]
    fn test_config_pretty_string() {
        let config = RegistryConfig::new("/tmp/frames").with_capacity_rule("access", "access", 1024);
        let pretty = config.to_string_pretty();

        assert!(pretty.contains("Storage Configuration:"));
        assert!(pretty.contains("Capacity Configuration:"));
        assert!(pretty.contains("Reliability Settings:"));
        assert!(pretty.contains("Rule 'access'"));
    }
}
