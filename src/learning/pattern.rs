//! Learned word-pattern records
//!
//! A pattern maps a normalized word set to one SQL template, with usage
//! count, example questions and provenance.

use crate::nlq::normalizer::WordSet;
use crate::template::placeholder::unknown_placeholders;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a pattern came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "seed")]
    Seed,
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "fallback-learned")]
    FallbackLearned,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Manual => "manual",
            Self::FallbackLearned => "fallback-learned",
        }
    }

    /// Accepts the current names plus older spellings found in stored documents
    pub fn parse_lenient(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "seed" | "tz" | "builtin" => Self::Seed,
            "fallback-learned" | "fallback_learned" | "llm" => Self::FallbackLearned,
            _ => Self::Manual,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic key of a word set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternKey(String);

impl PatternKey {
    /// Hash of the sorted words joined by single spaces
    pub fn from_words(words: &WordSet) -> Self {
        let joined = words.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
        Self(format!("{:016x}", fxhash::hash64(joined.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliseconds since the UNIX epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A learned pattern
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub key: PatternKey,
    pub words: WordSet,
    pub template: String,
    /// Times learned or matched, never below 1
    pub count: u64,
    pub examples: Vec<String>,
    pub source: Provenance,
    pub created_at: u64,
}

impl Pattern {
    /// None for an empty word set: such a pattern would match every question
    pub fn new(
        words: WordSet,
        template: impl Into<String>,
        example: impl Into<String>,
        source: Provenance,
    ) -> Option<Self> {
        if words.is_empty() {
            return None;
        }
        Some(Self {
            key: PatternKey::from_words(&words),
            words,
            template: template.into(),
            count: 1,
            examples: vec![example.into()],
            source,
            created_at: now_millis(),
        })
    }

    /// Bump the usage count and append the example; past `max_examples` the
    /// oldest examples are dropped
    pub fn record_use(&mut self, example: &str, max_examples: usize) {
        self.count = self.count.saturating_add(1);
        self.examples.push(example.to_string());
        if self.examples.len() > max_examples {
            let excess = self.examples.len() - max_examples;
            self.examples.drain(..excess);
        }
    }

    /// Every pattern word appears in the question
    pub fn is_subset_of(&self, words: &WordSet) -> bool {
        !self.words.is_empty() && self.words.is_subset(words)
    }

    /// Share of the pattern's words present in the question
    pub fn coverage(&self, words: &WordSet) -> f64 {
        if self.words.is_empty() {
            return 0.0;
        }
        let hit = self.words.intersection(words).count();
        hit as f64 / self.words.len() as f64
    }

    /// Ranking among candidates: more words, then more uses, then newer
    pub fn outranks(&self, other: &Pattern) -> bool {
        let mine = (self.words.len(), self.count, self.created_at);
        let theirs = (other.words.len(), other.count, other.created_at);
        mine > theirs || (mine == theirs && self.key < other.key)
    }
}

/// Stored form of a pattern; every field optional so older documents load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<String>>,
    #[serde(default, alias = "sql_template", skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Milliseconds; non-numeric legacy values load as 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<serde_json::Value>,
}

impl From<&Pattern> for PatternRecord {
    fn from(pattern: &Pattern) -> Self {
        Self {
            words: Some(pattern.words.iter().cloned().collect()),
            template: Some(pattern.template.clone()),
            count: Some(pattern.count),
            examples: Some(pattern.examples.clone()),
            source: Some(pattern.source.as_str().to_string()),
            created_at: Some(serde_json::Value::from(pattern.created_at)),
        }
    }
}

impl PatternRecord {
    /// Migrate a stored record into a pattern, or say why it cannot be used
    pub fn into_pattern(self) -> Result<Pattern, String> {
        let words: WordSet = self
            .words
            .ok_or("missing word set")?
            .into_iter()
            .filter(|w| !w.trim().is_empty())
            .collect();
        if words.is_empty() {
            return Err("empty word set".to_string());
        }

        let template = self.template.ok_or("missing template")?;
        if template.trim().is_empty() {
            return Err("empty template".to_string());
        }
        let unknown = unknown_placeholders(&template);
        if !unknown.is_empty() {
            return Err(format!("unknown placeholders {}", unknown.join(", ")));
        }

        Ok(Pattern {
            key: PatternKey::from_words(&words),
            words,
            template,
            count: self.count.unwrap_or(1).max(1),
            examples: self.examples.unwrap_or_default(),
            source: self
                .source
                .as_deref()
                .map(Provenance::parse_lenient)
                .unwrap_or(Provenance::Manual),
            created_at: self
                .created_at
                .and_then(|value| value.as_u64())
                .unwrap_or(0),
        })
    }
}
