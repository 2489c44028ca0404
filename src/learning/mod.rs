/// Pattern learning
/// Stores word-set patterns and an exact cache, persists them, and seeds built-in examples
pub mod pattern;
pub mod pattern_store;
pub mod persistence;
pub mod seed;

pub use pattern::{Pattern, PatternKey, PatternRecord, Provenance};
pub use pattern_store::{FlushReport, PatternStore, UpsertOutcome};
pub use persistence::{JsonDocument, StorePersistence};
pub use seed::{seed_store, SEED_EXAMPLES};
