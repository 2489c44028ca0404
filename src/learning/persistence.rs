//! Persistence layer for the pattern store (two JSON documents)

use crate::learning::pattern::{Pattern, PatternKey, PatternRecord};
use crate::template::placeholder::has_placeholders;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonDocument {
    path: PathBuf,
}

impl JsonDocument {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the document; None if the file does not exist
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(value))
    }

    /// Save the document: write a temporary file, then rename over the target
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory for {}", self.path.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", self.path.display()))?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename temp file to {}", self.path.display()))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Exact-cache and pattern documents of one store
#[derive(Debug, Clone)]
pub struct StorePersistence {
    exact: JsonDocument,
    patterns: JsonDocument,
}

impl StorePersistence {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(exact_path: P, patterns_path: Q) -> Self {
        Self {
            exact: JsonDocument::new(exact_path),
            patterns: JsonDocument::new(patterns_path),
        }
    }

    /// Exact cache entries; entries whose SQL carries placeholders are dropped
    pub fn load_exact(&self) -> Result<BTreeMap<String, String>> {
        let mut entries: BTreeMap<String, String> = self.exact.load()?.unwrap_or_default();
        let before = entries.len();
        entries.retain(|_, sql| !sql.trim().is_empty() && !has_placeholders(sql));
        if entries.len() < before {
            tracing::warn!(
                dropped = before - entries.len(),
                path = %self.exact.path().display(),
                "dropped exact-cache entries holding templates"
            );
        }
        Ok(entries)
    }

    /// Patterns keyed by their recomputed key; unusable records are skipped
    pub fn load_patterns(&self) -> Result<BTreeMap<PatternKey, Pattern>> {
        let raw: BTreeMap<String, serde_json::Value> = self.patterns.load()?.unwrap_or_default();
        let mut patterns: BTreeMap<PatternKey, Pattern> = BTreeMap::new();

        for (stored_key, value) in raw {
            let record: PatternRecord = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(key = %stored_key, error = %e, "skipping malformed pattern record");
                    continue;
                }
            };
            let pattern = match record.into_pattern() {
                Ok(pattern) => pattern,
                Err(reason) => {
                    tracing::warn!(key = %stored_key, %reason, "skipping unusable pattern record");
                    continue;
                }
            };
            if pattern.key.as_str() != stored_key {
                tracing::debug!(old = %stored_key, new = %pattern.key, "re-keyed pattern");
            }
            if patterns.contains_key(&pattern.key) {
                tracing::warn!(key = %pattern.key, "duplicate word set in pattern document, keeping first");
                continue;
            }
            patterns.insert(pattern.key.clone(), pattern);
        }

        Ok(patterns)
    }

    pub fn save_exact(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        self.exact.save(entries)
    }

    pub fn save_patterns(&self, patterns: &BTreeMap<PatternKey, Pattern>) -> Result<()> {
        let records: BTreeMap<&str, PatternRecord> = patterns
            .iter()
            .map(|(key, pattern)| (key.as_str(), PatternRecord::from(pattern)))
            .collect();
        self.patterns.save(&records)
    }

    pub fn exact_path(&self) -> &Path {
        self.exact.path()
    }

    pub fn patterns_path(&self) -> &Path {
        self.patterns.path()
    }
}
