//! Query Constructor - resolves a question to SQL
//!
//! Resolution order: exact cache, most specific stored pattern, fallback
//! model, default query. `resolve` always yields SQL; every failure on the
//! way is logged and ends in the default query.

use crate::config::ConstructorConfig;
use crate::error::{ConstructorError, ConstructorResult};
use crate::learning::pattern::{PatternKey, Provenance};
use crate::learning::pattern_store::{FlushReport, PatternStore, UpsertOutcome};
use crate::learning::seed::seed_store;
use crate::llm::fallback::{FallbackModel, OllamaFallback};
use crate::llm::safety::{SafetyVerdict, SqlSafetyValidator};
use crate::nlq::normalizer::Normalizer;
use crate::template::filler::TemplateFiller;
use crate::template::generalizer::{truncate_statement, SqlGeneralizer};
use crate::template::placeholder::has_placeholders;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How a question was answered
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    ExactHit,
    PatternHit { key: PatternKey },
    /// Fallback answer; `learned` is the pattern it was stored under
    FallbackHit { learned: Option<PatternKey> },
    /// Default query, with the failure that led there
    Default { reason: ConstructorError },
}

impl ResolutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ExactHit => "exact",
            Self::PatternHit { .. } => "pattern",
            Self::FallbackHit { .. } => "fallback",
            Self::Default { .. } => "default",
        }
    }
}

/// SQL plus how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub sql: String,
    pub outcome: ResolutionOutcome,
}

/// Counters and store sizes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConstructorStats {
    pub total_patterns: usize,
    pub cache_size: usize,
    pub exact_hits: u64,
    pub pattern_hits: u64,
    pub fallback_calls: u64,
    pub fallback_learned: u64,
    pub default_answers: u64,
    pub most_used_pattern: Option<Vec<String>>,
    pub most_used_count: u64,
}

#[derive(Default)]
struct Counters {
    exact_hits: AtomicU64,
    pattern_hits: AtomicU64,
    fallback_calls: AtomicU64,
    fallback_learned: AtomicU64,
    default_answers: AtomicU64,
}

/// Question-to-SQL resolver
pub struct QueryConstructor {
    config: ConstructorConfig,
    store: PatternStore,
    normalizer: Normalizer,
    generalizer: SqlGeneralizer,
    filler: TemplateFiller,
    safety: SqlSafetyValidator,
    fallback: Option<Arc<dyn FallbackModel>>,
    counters: Counters,
}

impl QueryConstructor {
    /// Constructor backed by the configured documents. Attaches the Ollama
    /// fallback when enabled in config.
    pub fn new(config: ConstructorConfig) -> ConstructorResult<Self> {
        config.validate()?;
        let store = PatternStore::open(&config.store);
        let mut constructor = Self::with_store(config, store);

        if constructor.config.fallback.enabled {
            let model = OllamaFallback::new(&constructor.config.fallback)
                .map_err(|e| ConstructorError::config(format!("{:#}", e)))?;
            tracing::info!(model = model.name(), "fallback model enabled");
            constructor.fallback = Some(Arc::new(model));
        }
        Ok(constructor)
    }

    /// Constructor without persistence or fallback
    pub fn in_memory(config: ConstructorConfig) -> Self {
        let store = PatternStore::in_memory(&config.store);
        Self::with_store(config, store)
    }

    fn with_store(config: ConstructorConfig, store: PatternStore) -> Self {
        if config.store.seed_patterns {
            seed_store(&store);
        }
        Self {
            config,
            store,
            normalizer: Normalizer::new(),
            generalizer: SqlGeneralizer::new(),
            filler: TemplateFiller::new(),
            safety: SqlSafetyValidator::new(),
            fallback: None,
            counters: Counters::default(),
        }
    }

    /// Attach (or replace) the fallback model
    pub fn with_fallback(mut self, model: Arc<dyn FallbackModel>) -> Self {
        self.fallback = Some(model);
        self
    }

    pub fn config(&self) -> &ConstructorConfig {
        &self.config
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// SQL for the question; never fails
    pub async fn resolve(&self, query: &str, allow_fallback: bool) -> String {
        self.resolve_detailed(query, allow_fallback).await.sql
    }

    /// SQL for the question along with how it was obtained
    pub async fn resolve_detailed(&self, query: &str, allow_fallback: bool) -> Resolution {
        let key = query.trim();

        // 1. Exact cache
        if let Some(sql) = self.store.lookup_exact(key) {
            self.counters.exact_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(query = key, "exact cache hit");
            return Resolution {
                sql,
                outcome: ResolutionOutcome::ExactHit,
            };
        }

        // 2. Stored patterns
        let words = self.normalizer.normalize(key);
        let miss = match self.store.find_pattern(&words) {
            Some(pattern) => match self.filler.fill(&pattern.template, key) {
                Ok(sql) => {
                    self.store.record_hit(&pattern.key, key);
                    self.store.put_exact(key, &sql);
                    self.counters.pattern_hits.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        query = key,
                        pattern = %pattern.key,
                        words = pattern.words.len(),
                        count = pattern.count,
                        "pattern hit"
                    );
                    return Resolution {
                        sql,
                        outcome: ResolutionOutcome::PatternHit { key: pattern.key },
                    };
                }
                Err(e) => {
                    tracing::warn!(query = key, pattern = %pattern.key, error = %e, "matched pattern could not be filled");
                    e
                }
            },
            None => ConstructorError::no_pattern_match(
                format!("no stored pattern covers \"{key}\""),
                words.len(),
            ),
        };

        // 3. Fallback model
        let reason = match (&self.fallback, allow_fallback) {
            (Some(model), true) => match self.ask_fallback(model.as_ref(), key).await {
                Ok(resolution) => return resolution,
                Err(e) => e,
            },
            _ => miss,
        };

        // 4. Default
        self.counters.default_answers.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(query = key, kind = reason.kind(), reason = %reason, "answering with default query");
        Resolution {
            sql: self.config.default_sql.clone(),
            outcome: ResolutionOutcome::Default { reason },
        }
    }

    async fn ask_fallback(&self, model: &dyn FallbackModel, query: &str) -> ConstructorResult<Resolution> {
        self.counters.fallback_calls.fetch_add(1, Ordering::Relaxed);
        let timeout = self.config.fallback.timeout();
        tracing::info!(query, model = model.name(), "asking fallback model");

        let answer = match tokio::time::timeout(timeout, model.ask(query)).await {
            Err(_) => {
                return Err(ConstructorError::fallback_unavailable_with_reason(
                    "fallback model timed out",
                    format!("{}s elapsed", timeout.as_secs_f64()),
                ))
            }
            Ok(Err(e)) => {
                return Err(ConstructorError::fallback_unavailable_with_reason(
                    "fallback model failed",
                    format!("{:#}", e),
                ))
            }
            Ok(Ok(None)) => return Err(ConstructorError::fallback_unavailable("fallback model had no answer")),
            Ok(Ok(Some(answer))) => answer,
        };

        if !answer.is_safe {
            return Err(ConstructorError::unsafe_sql_with_statement(
                "fallback model flagged its own SQL as unsafe",
                answer.sql,
            ));
        }

        let sql = truncate_statement(answer.sql.trim()).to_string();
        if sql.is_empty() {
            return Err(ConstructorError::fallback_unavailable("fallback model returned empty SQL"));
        }
        if has_placeholders(&sql) {
            return Err(ConstructorError::fallback_unavailable_with_reason(
                "fallback SQL is not concrete",
                sql,
            ));
        }
        if let SafetyVerdict::Unsafe { reason } = self.safety.validate(&sql) {
            return Err(ConstructorError::unsafe_sql_with_statement(reason, sql));
        }

        let learned = self.learn(query, &sql, Provenance::FallbackLearned).map(|o| o.key);
        if learned.is_some() {
            self.counters.fallback_learned.fetch_add(1, Ordering::Relaxed);
        }

        Ok(Resolution {
            sql,
            outcome: ResolutionOutcome::FallbackHit { learned },
        })
    }

    /// Learn a question/SQL pair: generalize the SQL, store the pattern and
    /// cache the concrete SQL for the exact question
    pub fn learn(&self, query: &str, sql: &str, source: Provenance) -> Option<UpsertOutcome> {
        let query = query.trim();
        let sql = sql.trim();
        if query.is_empty() || sql.is_empty() {
            return None;
        }

        let template = self.generalizer.generalize(sql);
        let words = self.normalizer.normalize(query);
        self.store.put_exact(query, truncate_statement(sql));

        let outcome = self.store.upsert_pattern(words, &template, query, source);
        if outcome.is_none() {
            tracing::debug!(query, "question has no pattern words, cached exactly only");
        }
        outcome
    }

    /// Manually taught pair
    pub fn add_manual_pattern(&self, query: &str, sql: &str) -> Option<UpsertOutcome> {
        self.learn(query, sql, Provenance::Manual)
    }

    /// Wipe the exact cache; patterns stay
    pub fn clear_cache(&self) {
        self.store.clear();
    }

    /// Wipe exact cache and all patterns
    pub fn reset(&self) {
        self.store.reset();
    }

    pub fn stats(&self) -> ConstructorStats {
        let most_used = self.store.most_used();
        ConstructorStats {
            total_patterns: self.store.pattern_count(),
            cache_size: self.store.exact_count(),
            exact_hits: self.counters.exact_hits.load(Ordering::Relaxed),
            pattern_hits: self.counters.pattern_hits.load(Ordering::Relaxed),
            fallback_calls: self.counters.fallback_calls.load(Ordering::Relaxed),
            fallback_learned: self.counters.fallback_learned.load(Ordering::Relaxed),
            default_answers: self.counters.default_answers.load(Ordering::Relaxed),
            most_used_count: most_used.as_ref().map_or(0, |p| p.count),
            most_used_pattern: most_used.map(|p| p.words.into_iter().collect()),
        }
    }

    /// Persist the store
    pub fn flush(&self) -> ConstructorResult<FlushReport> {
        self.store.flush().inspect_err(|e| {
            tracing::error!(error = %e, "flushing pattern store failed");
        })
    }

    /// Flush periodically in the background until the handle is aborted
    pub fn spawn_autoflush(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let constructor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if constructor.store.is_dirty() {
                    // Errors are logged inside flush and retried on the next tick
                    let _ = constructor.flush();
                }
            }
        })
    }
}
