//! Fallback model - asked for SQL only when no stored pattern matches
//!
//! The constructor treats any model as untrusted: it bounds every call with a
//! timeout and re-checks the answer before returning or learning it.

use crate::config::FallbackConfig;
use crate::learning::seed::SEED_EXAMPLES;
use crate::llm::ollama_client::{strip_code_fences, OllamaClient};
use crate::llm::safety::SqlSafetyValidator;
use anyhow::Result;
use async_trait::async_trait;

/// SQL proposed by a fallback model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackAnswer {
    pub sql: String,
    /// The model's own safety judgement
    pub is_safe: bool,
}

impl FallbackAnswer {
    pub fn new(sql: impl Into<String>, is_safe: bool) -> Self {
        Self {
            sql: sql.into(),
            is_safe,
        }
    }
}

/// Anything that can propose SQL for a question.
/// `Ok(None)` means the model had no answer; errors are transport failures.
#[async_trait]
pub trait FallbackModel: Send + Sync {
    async fn ask(&self, query: &str) -> Result<Option<FallbackAnswer>>;

    fn name(&self) -> &str {
        "fallback"
    }
}

const SCHEMA: &str = r#"PostgreSQL schema:

videos: one row per video, final totals
  id UUID, creator_id TEXT (32 hex chars), video_created_at TIMESTAMP,
  views_count INT, likes_count INT, comments_count INT, reports_count INT,
  created_at TIMESTAMP, updated_at TIMESTAMP

video_snapshots: hourly measurements of each video
  id TEXT, video_id UUID (references videos.id), created_at TIMESTAMP,
  views_count INT, likes_count INT, comments_count INT, reports_count INT,
  delta_views_count INT, delta_likes_count INT, delta_comments_count INT, delta_reports_count INT
  (delta_* = growth since the previous snapshot)"#;

const RULES: &str = r#"Rules:
- Answer with exactly one PostgreSQL SELECT statement and nothing else, ending with ';'.
- The answer must be a single number (COUNT, SUM, AVG, MIN or MAX).
- Publication date of a video: DATE(video_created_at). Date of a measurement: DATE(created_at).
- Growth over a period: SUM(delta_*) from video_snapshots.
- Hour of day: EXTRACT(HOUR FROM created_at).
- Never modify data."#;

/// Fallback backed by an Ollama server
pub struct OllamaFallback {
    client: OllamaClient,
    validator: SqlSafetyValidator,
}

impl OllamaFallback {
    pub fn new(config: &FallbackConfig) -> Result<Self> {
        Ok(Self {
            client: OllamaClient::new(config)?,
            validator: SqlSafetyValidator::new(),
        })
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    /// Prompt with schema, rules and a few worked examples
    pub fn build_prompt(query: &str) -> String {
        let examples: String = SEED_EXAMPLES
            .iter()
            .take(5)
            .map(|(question, sql)| format!("Question: {question}\nSQL: {sql};\n\n"))
            .collect();

        format!(
            "You translate questions about video statistics into SQL.\n\n{SCHEMA}\n\n{RULES}\n\nExamples:\n\n{examples}Question: {query}\nSQL:"
        )
    }
}

#[async_trait]
impl FallbackModel for OllamaFallback {
    async fn ask(&self, query: &str) -> Result<Option<FallbackAnswer>> {
        let prompt = Self::build_prompt(query);
        let response = self.client.generate(&prompt).await?;

        let Some(sql) = extract_sql(&response) else {
            tracing::warn!(model = self.client.model(), "no SQL found in model response");
            return Ok(None);
        };

        let is_safe = self.validator.validate(&sql).is_safe();
        tracing::debug!(model = self.client.model(), %sql, is_safe, "model proposed SQL");
        Ok(Some(FallbackAnswer { sql, is_safe }))
    }

    fn name(&self) -> &str {
        self.client.model()
    }
}

/// Pull the first SQL statement out of free-form model output: code fences
/// are stripped, text starts at the first line beginning with SELECT and ends
/// at the first line closing with ';'.
pub fn extract_sql(response: &str) -> Option<String> {
    let body = strip_code_fences(response);

    let mut lines: Vec<&str> = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if lines.is_empty() && !trimmed.to_uppercase().starts_with("SELECT") {
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        lines.push(trimmed);
        if trimmed.ends_with(';') {
            break;
        }
    }

    let sql = lines.join("\n");
    let upper = sql.to_uppercase();
    if sql.is_empty() || !upper.contains("SELECT") || !upper.contains("FROM") {
        return None;
    }
    Some(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_fenced_block() {
        let response = "Here you go:\n```sql\nSELECT COUNT(*)\nFROM videos;\n```";
        // Fence stripping only applies to a response that starts with one
        assert_eq!(extract_sql(response).as_deref(), Some("SELECT COUNT(*)\nFROM videos;"));

        let response = "```sql\nSELECT COUNT(*) FROM videos;\n```";
        assert_eq!(extract_sql(response).as_deref(), Some("SELECT COUNT(*) FROM videos;"));
    }

    #[test]
    fn test_extract_stops_at_terminator() {
        let response = "SELECT SUM(views_count) FROM videos;\nThis sums all views.";
        assert_eq!(extract_sql(response).as_deref(), Some("SELECT SUM(views_count) FROM videos;"));
    }

    #[test]
    fn test_extract_starts_at_select_line() {
        let response = "WITH totals AS (SELECT 1)\nSELECT COUNT(*) FROM videos;";
        assert_eq!(extract_sql(response).as_deref(), Some("SELECT COUNT(*) FROM videos;"));
        assert_eq!(extract_sql("WITH t AS (SELECT views_count FROM videos) SELECT 1;"), None);
    }

    #[test]
    fn test_extract_requires_select_from() {
        assert_eq!(extract_sql("I cannot answer that."), None);
        assert_eq!(extract_sql("SELECT 1;"), None);
    }

    #[test]
    fn test_prompt_mentions_schema_and_question() {
        let prompt = OllamaFallback::build_prompt("Сколько видео?");
        assert!(prompt.contains("video_snapshots"));
        assert!(prompt.contains("delta_views_count"));
        assert!(prompt.ends_with("Question: Сколько видео?\nSQL:"));
    }
}
