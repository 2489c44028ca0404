//! Pattern Store - exact cache plus word-set patterns
//!
//! Both maps are concurrent; a single key is always updated atomically
//! through the map's entry API, so two writers on one key never lose a
//! count or an example. Persistence is decoupled: mutations mark the store
//! dirty and `flush` writes both documents.

use crate::config::StoreConfig;
use crate::error::{ConstructorError, ConstructorResult};
use crate::learning::pattern::{Pattern, PatternKey, Provenance};
use crate::learning::persistence::StorePersistence;
use crate::nlq::normalizer::WordSet;
use crate::template::placeholder::has_placeholders;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Outcome of learning a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub key: PatternKey,
    /// True when the word set was new
    pub created: bool,
    pub count: u64,
}

/// What a flush wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub exact_entries: usize,
    pub patterns: usize,
    /// False when the store had nothing to write
    pub written: bool,
}

/// Exact cache and learned patterns
pub struct PatternStore {
    patterns: DashMap<PatternKey, Pattern>,
    exact: DashMap<String, String>,
    min_coverage: f64,
    max_examples: usize,
    persistence: Option<StorePersistence>,
    dirty: AtomicBool,
    // Set by clear/reset so the next flush does not merge the wiped entries back from disk
    exact_cleared: AtomicBool,
    patterns_reset: AtomicBool,
    flush_lock: Mutex<()>,
}

impl PatternStore {
    /// Store without persistence
    pub fn in_memory(config: &StoreConfig) -> Self {
        Self {
            patterns: DashMap::new(),
            exact: DashMap::new(),
            min_coverage: config.min_coverage,
            max_examples: config.max_examples_per_pattern.max(1),
            persistence: None,
            dirty: AtomicBool::new(false),
            exact_cleared: AtomicBool::new(false),
            patterns_reset: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    /// Store backed by the configured documents. Missing files start empty;
    /// an unreadable document is logged and treated as empty.
    pub fn open(config: &StoreConfig) -> Self {
        let persistence = StorePersistence::new(&config.exact_cache_path, &config.patterns_path);
        let mut store = Self::in_memory(config);

        match persistence.load_exact() {
            Ok(entries) => {
                for (query, sql) in entries {
                    store.exact.insert(query, sql);
                }
            }
            Err(e) => tracing::warn!(
                path = %persistence.exact_path().display(),
                error = %format!("{:#}", e),
                "could not load exact cache, starting empty"
            ),
        }

        match persistence.load_patterns() {
            Ok(patterns) => {
                for (key, pattern) in patterns {
                    store.patterns.insert(key, pattern);
                }
            }
            Err(e) => tracing::warn!(
                path = %persistence.patterns_path().display(),
                error = %format!("{:#}", e),
                "could not load patterns, starting empty"
            ),
        }

        tracing::info!(
            patterns = store.patterns.len(),
            exact = store.exact.len(),
            "pattern store loaded"
        );
        store.persistence = Some(persistence);
        store
    }

    /// SQL previously returned for exactly this question
    pub fn lookup_exact(&self, query: &str) -> Option<String> {
        self.exact.get(query).map(|sql| sql.value().clone())
    }

    /// Remember concrete SQL for a question. Refuses templates.
    pub fn put_exact(&self, query: &str, sql: &str) -> bool {
        if query.is_empty() || sql.trim().is_empty() || has_placeholders(sql) {
            tracing::debug!(query, "refusing exact-cache entry");
            return false;
        }
        self.exact.insert(query.to_string(), sql.to_string());
        self.mark_dirty();
        true
    }

    /// Most specific pattern whose words all appear in the question
    pub fn find_pattern(&self, words: &WordSet) -> Option<Pattern> {
        if words.is_empty() {
            return None;
        }

        let mut best: Option<Pattern> = None;
        for entry in self.patterns.iter() {
            let pattern = entry.value();
            if !pattern.is_subset_of(words) || pattern.coverage(words) < self.min_coverage {
                continue;
            }
            if best.as_ref().map_or(true, |current| pattern.outranks(current)) {
                best = Some(pattern.clone());
            }
        }

        if let Some(pattern) = &best {
            tracing::debug!(key = %pattern.key, words = pattern.words.len(), "pattern matched");
        }
        best
    }

    /// Count a successful match and remember the question as an example
    pub fn record_hit(&self, key: &PatternKey, example: &str) -> bool {
        match self.patterns.get_mut(key) {
            Some(mut pattern) => {
                pattern.record_use(example, self.max_examples);
                drop(pattern);
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Learn a template for a word set. An existing pattern keeps its
    /// template; its count goes up and the example is appended.
    pub fn upsert_pattern(
        &self,
        words: WordSet,
        template: &str,
        example: &str,
        source: Provenance,
    ) -> Option<UpsertOutcome> {
        let pattern = Pattern::new(words, template, example, source)?;
        let key = pattern.key.clone();

        let outcome = match self.patterns.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.record_use(example, self.max_examples);
                UpsertOutcome {
                    key,
                    created: false,
                    count: existing.count,
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(pattern);
                UpsertOutcome {
                    key,
                    created: true,
                    count: 1,
                }
            }
        };

        self.mark_dirty();
        tracing::info!(
            key = %outcome.key,
            created = outcome.created,
            count = outcome.count,
            %source,
            "pattern learned"
        );
        Some(outcome)
    }

    /// Insert a pattern only if its word set is unknown
    pub fn insert_if_absent(&self, words: WordSet, template: &str, example: &str, source: Provenance) -> bool {
        let Some(pattern) = Pattern::new(words, template, example, source) else {
            return false;
        };
        match self.patterns.entry(pattern.key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(pattern);
                self.mark_dirty();
                true
            }
        }
    }

    pub fn get(&self, key: &PatternKey) -> Option<Pattern> {
        self.patterns.get(key).map(|p| p.value().clone())
    }

    /// Snapshot of all patterns, sorted by key
    pub fn patterns(&self) -> Vec<Pattern> {
        let mut all: Vec<Pattern> = self.patterns.iter().map(|p| p.value().clone()).collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Pattern with the highest usage count
    pub fn most_used(&self) -> Option<Pattern> {
        self.patterns
            .iter()
            .max_by(|a, b| a.count.cmp(&b.count).then_with(|| b.key.cmp(&a.key)))
            .map(|p| p.value().clone())
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn exact_count(&self) -> usize {
        self.exact.len()
    }

    /// Wipe the exact cache only; patterns survive
    pub fn clear(&self) {
        self.exact.clear();
        self.exact_cleared.store(true, Ordering::SeqCst);
        self.mark_dirty();
        tracing::info!("exact cache cleared");
    }

    /// Wipe the exact cache and all patterns
    pub fn reset(&self) {
        self.exact.clear();
        self.patterns.clear();
        self.exact_cleared.store(true, Ordering::SeqCst);
        self.patterns_reset.store(true, Ordering::SeqCst);
        self.mark_dirty();
        tracing::info!("pattern store reset");
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Write both documents. Entries only present on disk (written by another
    /// process) are kept; in-memory entries win on conflict.
    pub fn flush(&self) -> ConstructorResult<FlushReport> {
        let Some(persistence) = &self.persistence else {
            return Ok(FlushReport::default());
        };
        let _guard = self
            .flush_lock
            .lock()
            .map_err(|_| ConstructorError::internal("flush lock poisoned"))?;

        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(FlushReport::default());
        }
        let exact_cleared = self.exact_cleared.swap(false, Ordering::SeqCst);
        let patterns_reset = self.patterns_reset.swap(false, Ordering::SeqCst);

        let result = self.write_documents(persistence, exact_cleared, patterns_reset);
        if result.is_err() {
            // Retry on the next flush with the same merge rules
            self.dirty.store(true, Ordering::SeqCst);
            if exact_cleared {
                self.exact_cleared.store(true, Ordering::SeqCst);
            }
            if patterns_reset {
                self.patterns_reset.store(true, Ordering::SeqCst);
            }
        }
        result
    }

    fn write_documents(
        &self,
        persistence: &StorePersistence,
        exact_cleared: bool,
        patterns_reset: bool,
    ) -> ConstructorResult<FlushReport> {
        let mut exact: BTreeMap<String, String> = if exact_cleared {
            BTreeMap::new()
        } else {
            persistence.load_exact().unwrap_or_else(|e| {
                tracing::warn!(error = %format!("{:#}", e), "exact cache on disk unreadable, overwriting");
                BTreeMap::new()
            })
        };
        for entry in self.exact.iter() {
            exact.insert(entry.key().clone(), entry.value().clone());
        }

        let mut patterns: BTreeMap<PatternKey, Pattern> = if patterns_reset {
            BTreeMap::new()
        } else {
            persistence.load_patterns().unwrap_or_else(|e| {
                tracing::warn!(error = %format!("{:#}", e), "patterns on disk unreadable, overwriting");
                BTreeMap::new()
            })
        };
        for entry in self.patterns.iter() {
            patterns.insert(entry.key().clone(), entry.value().clone());
        }

        persistence.save_exact(&exact).map_err(|e| {
            ConstructorError::persistence_with_path(format!("{:#}", e), persistence.exact_path().display().to_string())
        })?;
        persistence.save_patterns(&patterns).map_err(|e| {
            ConstructorError::persistence_with_path(
                format!("{:#}", e),
                persistence.patterns_path().display().to_string(),
            )
        })?;

        tracing::info!(exact = exact.len(), patterns = patterns.len(), "pattern store flushed");
        Ok(FlushReport {
            exact_entries: exact.len(),
            patterns: patterns.len(),
            written: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn words(list: &[&str]) -> WordSet {
        list.iter().map(|w| w.to_string()).collect()
    }

    fn store() -> PatternStore {
        PatternStore::in_memory(&StoreConfig::default())
    }

    #[test]
    fn test_most_specific_wins() {
        let store = store();
        store.upsert_pattern(words(&["сколько", "видео"]), "SELECT COUNT(*) FROM videos", "a", Provenance::Manual);
        store.upsert_pattern(
            words(&["сколько", "видео", "креатора"]),
            "SELECT COUNT(*) FROM videos WHERE creator_id = '{ID}'",
            "b",
            Provenance::Manual,
        );

        let found = store
            .find_pattern(&words(&["сколько", "видео", "креатора", "IDCREATOR"]))
            .unwrap();
        assert_eq!(found.words.len(), 3);

        let found = store.find_pattern(&words(&["сколько", "видео"])).unwrap();
        assert_eq!(found.words.len(), 2);
    }

    #[test]
    fn test_count_breaks_ties() {
        let store = store();
        store.upsert_pattern(words(&["сколько", "видео"]), "SELECT 1 FROM videos", "a", Provenance::Manual);
        let busy = store
            .upsert_pattern(words(&["сумма", "видео"]), "SELECT 2 FROM videos", "b", Provenance::Manual)
            .unwrap();
        store.record_hit(&busy.key, "c");

        let found = store.find_pattern(&words(&["сколько", "сумма", "видео"])).unwrap();
        assert_eq!(found.key, busy.key);
    }

    #[test]
    fn test_no_match_without_subset() {
        let store = store();
        store.upsert_pattern(words(&["сколько", "видео"]), "SELECT 1 FROM videos", "a", Provenance::Manual);
        assert!(store.find_pattern(&words(&["сколько"])).is_none());
        assert!(store.find_pattern(&WordSet::new()).is_none());
    }

    #[test]
    fn test_upsert_keeps_first_template() {
        let store = store();
        let first = store
            .upsert_pattern(words(&["видео"]), "SELECT 1 FROM videos", "a", Provenance::Manual)
            .unwrap();
        assert!(first.created);
        let second = store
            .upsert_pattern(words(&["видео"]), "SELECT 2 FROM videos", "b", Provenance::FallbackLearned)
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.count, 2);

        let pattern = store.get(&first.key).unwrap();
        assert_eq!(pattern.template, "SELECT 1 FROM videos");
        assert_eq!(pattern.examples, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_put_exact_refuses_templates() {
        let store = store();
        assert!(!store.put_exact("q", "SELECT * FROM videos WHERE id = '{ID}'"));
        assert!(store.put_exact("q", "SELECT COUNT(*) FROM videos"));
        assert_eq!(store.lookup_exact("q").as_deref(), Some("SELECT COUNT(*) FROM videos"));
    }

    #[test]
    fn test_clear_and_reset() {
        let store = store();
        store.upsert_pattern(words(&["видео"]), "SELECT 1 FROM videos", "a", Provenance::Manual);
        store.put_exact("q", "SELECT 1 FROM videos");

        store.clear();
        assert_eq!(store.exact_count(), 0);
        assert_eq!(store.pattern_count(), 1);

        store.reset();
        assert_eq!(store.pattern_count(), 0);
    }

    #[test]
    fn test_insert_if_absent() {
        let store = store();
        assert!(store.insert_if_absent(words(&["видео"]), "SELECT 1 FROM videos", "a", Provenance::Seed));
        assert!(!store.insert_if_absent(words(&["видео"]), "SELECT 2 FROM videos", "b", Provenance::Seed));
        assert_eq!(store.patterns()[0].count, 1);
    }

    #[test]
    fn test_concurrent_upserts_lose_nothing() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.upsert_pattern(
                            words(&["сколько", "видео"]),
                            "SELECT COUNT(*) FROM videos",
                            &format!("q{t}-{i}"),
                            Provenance::Manual,
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let pattern = store.find_pattern(&words(&["сколько", "видео"])).unwrap();
        assert_eq!(pattern.count, 400);
        assert_eq!(pattern.examples.len(), StoreConfig::default().max_examples_per_pattern);
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.exact_cache_path = dir.path().join("cache.json");
        config.patterns_path = dir.path().join("patterns.json");

        let store = PatternStore::open(&config);
        store.upsert_pattern(words(&["видео"]), "SELECT 1 FROM videos", "a", Provenance::Manual);
        store.put_exact("a", "SELECT 1 FROM videos");
        let report = store.flush().unwrap();
        assert!(report.written);
        assert!(!store.is_dirty());

        let reopened = PatternStore::open(&config);
        assert_eq!(reopened.pattern_count(), 1);
        assert_eq!(reopened.lookup_exact("a").as_deref(), Some("SELECT 1 FROM videos"));
    }

    #[test]
    fn test_flush_merges_disk_entries_but_honors_clear() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.exact_cache_path = dir.path().join("cache.json");
        config.patterns_path = dir.path().join("patterns.json");

        let first = PatternStore::open(&config);
        let second = PatternStore::open(&config);

        first.put_exact("from first", "SELECT 1 FROM videos");
        first.flush().unwrap();
        second.put_exact("from second", "SELECT 2 FROM videos");
        second.flush().unwrap();

        let merged = PatternStore::open(&config);
        assert_eq!(merged.exact_count(), 2);

        merged.clear();
        merged.flush().unwrap();
        assert_eq!(PatternStore::open(&config).exact_count(), 0);
    }
}
