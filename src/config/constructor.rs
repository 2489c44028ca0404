/// Constructor configuration
///
/// Store locations and matching threshold, fallback model settings, and the
/// default query. Loadable from the environment or a JSON file.

use crate::error::{ConstructorError, ConstructorResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Query answered when nothing else resolves
pub const DEFAULT_SQL: &str = "SELECT COUNT(*) FROM videos";

/// Top-level constructor configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructorConfig {
    /// Pattern store configuration
    pub store: StoreConfig,

    /// Fallback model configuration
    pub fallback: FallbackConfig,

    /// Safe default query
    pub default_sql: String,
}

/// Pattern store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Exact-cache document (query -> SQL)
    pub exact_cache_path: PathBuf,

    /// Pattern document (pattern key -> pattern)
    pub patterns_path: PathBuf,

    /// Minimum share of a pattern's words found in the query
    pub min_coverage: f64,

    /// Example queries kept per pattern
    pub max_examples_per_pattern: usize,

    /// Insert the built-in seed patterns on startup
    pub seed_patterns: bool,
}

/// Fallback model configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Call the fallback model when no pattern matches
    pub enabled: bool,

    /// Ollama server address
    pub base_url: String,

    /// Model name
    pub model: String,

    /// Upper bound on one fallback call (seconds)
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for ConstructorConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            fallback: FallbackConfig::default(),
            default_sql: DEFAULT_SQL.to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            exact_cache_path: PathBuf::from("query_cache.json"),
            patterns_path: PathBuf::from("learned_patterns.json"),
            min_coverage: 0.9,
            max_examples_per_pattern: 50,
            seed_patterns: true,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            timeout_secs: 30,
            temperature: 0.1,
        }
    }
}

impl FallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ConstructorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store both documents inside `dir`, keeping the default file names
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.store.exact_cache_path = dir.join("query_cache.json");
        self.store.patterns_path = dir.join("learned_patterns.json");
        self
    }

    pub fn with_min_coverage(mut self, min_coverage: f64) -> Self {
        self.store.min_coverage = min_coverage;
        self
    }

    pub fn with_seed_patterns(mut self, enabled: bool) -> Self {
        self.store.seed_patterns = enabled;
        self
    }

    pub fn with_fallback_enabled(mut self, enabled: bool) -> Self {
        self.fallback.enabled = enabled;
        self
    }

    pub fn with_fallback_timeout(mut self, timeout_secs: u64) -> Self {
        self.fallback.timeout_secs = timeout_secs;
        self
    }

    pub fn with_default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default_sql = sql.into();
        self
    }

    /// Build from environment variables, defaulting anything unset
    pub fn from_env() -> ConstructorResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("ENABLE_LLM") {
            config.fallback.enabled = value.eq_ignore_ascii_case("true") || value == "1";
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.fallback.model = model;
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            config.fallback.base_url = url;
        }
        if let Ok(value) = std::env::var("LLM_TIMEOUT_SECS") {
            config.fallback.timeout_secs = value
                .parse()
                .map_err(|_| ConstructorError::config(format!("LLM_TIMEOUT_SECS is not a number: {value}")))?;
        }
        if let Ok(path) = std::env::var("QUERY_CACHE_FILE") {
            config.store.exact_cache_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PATTERNS_FILE") {
            config.store.patterns_path = PathBuf::from(path);
        }
        if let Ok(value) = std::env::var("MIN_COVERAGE") {
            config.store.min_coverage = value
                .parse()
                .map_err(|_| ConstructorError::config(format!("MIN_COVERAGE is not a number: {value}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> ConstructorResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))
            .map_err(|e| ConstructorError::config(format!("{:#}", e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ConstructorError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConstructorResult<()> {
        if !(self.store.min_coverage > 0.0 && self.store.min_coverage <= 1.0) {
            return Err(ConstructorError::config(format!(
                "min_coverage must be in (0, 1], got {}",
                self.store.min_coverage
            )));
        }
        if self.fallback.timeout_secs == 0 {
            return Err(ConstructorError::config("fallback timeout must be non-zero"));
        }
        if self.default_sql.trim().is_empty() {
            return Err(ConstructorError::config("default_sql must not be empty"));
        }
        if self.store.max_examples_per_pattern == 0 {
            return Err(ConstructorError::config("max_examples_per_pattern must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ConstructorConfig::default();
        assert_eq!(config.default_sql, DEFAULT_SQL);
        assert!(!config.fallback.enabled);
        assert!((config.store.min_coverage - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.fallback.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_coverage() {
        let config = ConstructorConfig::new().with_min_coverage(0.0);
        assert!(matches!(config.validate(), Err(ConstructorError::Config { .. })));

        let config = ConstructorConfig::new().with_min_coverage(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"store": {"min_coverage": 0.8}, "fallback": {"enabled": true}}"#).unwrap();

        let config = ConstructorConfig::from_file(&path).unwrap();
        assert!((config.store.min_coverage - 0.8).abs() < f64::EPSILON);
        assert!(config.fallback.enabled);
        assert_eq!(config.fallback.model, "llama3.2:3b");
        assert_eq!(config.store.patterns_path, PathBuf::from("learned_patterns.json"));
    }

    #[test]
    fn test_with_data_dir() {
        let config = ConstructorConfig::new().with_data_dir("/var/lib/qc");
        assert_eq!(config.store.exact_cache_path, PathBuf::from("/var/lib/qc/query_cache.json"));
        assert_eq!(config.store.patterns_path, PathBuf::from("/var/lib/qc/learned_patterns.json"));
    }
}
