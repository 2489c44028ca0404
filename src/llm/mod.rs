//! LLM Module - fallback SQL generation and the safety checks applied to it

pub mod fallback;
pub mod ollama_client;
pub mod safety;

pub use fallback::{extract_sql, FallbackAnswer, FallbackModel, OllamaFallback};
pub use ollama_client::OllamaClient;
pub use safety::{SafetyVerdict, SqlSafetyValidator};
