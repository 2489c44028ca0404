//! # Video Query Constructor
//!
//! Turns analytic questions about a video metrics dataset into SQL by
//! learning word-set patterns with parameterized SQL templates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use query_constructor::{ConstructorConfig, QueryConstructor};
//!
//! # async fn run() -> query_constructor::ConstructorResult<()> {
//! let constructor = QueryConstructor::new(ConstructorConfig::from_env()?)?;
//!
//! // Teach one example; similar questions reuse its template
//! constructor.add_manual_pattern(
//!     "Сколько видео набрало больше 1000 просмотров?",
//!     "SELECT COUNT(*) FROM videos WHERE views_count > 1000",
//! );
//!
//! let sql = constructor
//!     .resolve("Сколько видео набрало больше 250 просмотров?", false)
//!     .await;
//! assert_eq!(sql, "SELECT COUNT(*) FROM videos WHERE views_count > 250");
//!
//! constructor.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Exact cache**: repeated questions are answered verbatim
//! - **Word-set patterns**: word order does not matter; the most specific pattern wins
//! - **Parameter extraction**: dates, date ranges, months, hours, ids and numbers
//! - **Fallback model**: optional Ollama model for unseen questions, safety-checked and learned

pub mod config;
pub mod constructor;
pub mod error;
pub mod learning;
pub mod llm;
pub mod nlq;
pub mod template;

// Public API
pub use config::{ConstructorConfig, FallbackConfig, StoreConfig, DEFAULT_SQL};
pub use constructor::{ConstructorStats, QueryConstructor, Resolution, ResolutionOutcome};

pub use error::{ConstructorError, ConstructorResult};

pub use learning::{FlushReport, Pattern, PatternKey, PatternStore, Provenance, UpsertOutcome};
pub use llm::{FallbackAnswer, FallbackModel, OllamaFallback, SafetyVerdict, SqlSafetyValidator};
pub use nlq::{extract_parameters, normalize, Identifier, ParameterSet, WordSet};
pub use template::{fill_template, generalize_sql, Placeholder};
