/// Unified error type for the query constructor
/// Every variant is recoverable: the orchestrator logs it and answers with the default query
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructorError {
    /// No stored pattern covers the query's word set
    #[error("No pattern matched: {message}")]
    NoPatternMatch {
        message: String,
        words: usize,
    },

    /// Fallback model timed out, failed in transport, or answered with nothing usable
    #[error("Fallback unavailable: {message}")]
    FallbackUnavailable {
        message: String,
        reason: Option<String>,
    },

    /// Fallback SQL rejected by the safety allow-list
    #[error("Unsafe generated SQL: {reason}")]
    UnsafeGeneratedSql {
        reason: String,
        sql: Option<String>,
    },

    /// Template still carries placeholders after filling
    #[error("Unresolved placeholders: {}", placeholders.join(", "))]
    UnresolvedPlaceholders {
        placeholders: Vec<String>,
    },

    /// Loading or flushing the persisted documents failed
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        path: Option<String>,
    },

    /// Invalid configuration value
    #[error("Config error: {message}")]
    Config {
        message: String,
    },

    /// Internal errors: should never happen, indicates bug
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        context: Option<String>,
    },
}

impl ConstructorError {
    pub fn no_pattern_match(message: impl Into<String>, words: usize) -> Self {
        Self::NoPatternMatch {
            message: message.into(),
            words,
        }
    }

    pub fn fallback_unavailable(message: impl Into<String>) -> Self {
        Self::FallbackUnavailable {
            message: message.into(),
            reason: None,
        }
    }

    pub fn fallback_unavailable_with_reason(
        message: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::FallbackUnavailable {
            message: message.into(),
            reason: Some(reason.into()),
        }
    }

    pub fn unsafe_sql_with_statement(reason: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::UnsafeGeneratedSql {
            reason: reason.into(),
            sql: Some(sql.into()),
        }
    }

    pub fn unresolved(placeholders: Vec<String>) -> Self {
        Self::UnresolvedPlaceholders { placeholders }
    }

    pub fn persistence_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// Short machine-friendly name of the variant, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoPatternMatch { .. } => "no_pattern_match",
            Self::FallbackUnavailable { .. } => "fallback_unavailable",
            Self::UnsafeGeneratedSql { .. } => "unsafe_generated_sql",
            Self::UnresolvedPlaceholders { .. } => "unresolved_placeholders",
            Self::Persistence { .. } => "persistence",
            Self::Config { .. } => "config",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<anyhow::Error> for ConstructorError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: format!("{:#}", err),
            context: None,
        }
    }
}

impl From<std::io::Error> for ConstructorError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for ConstructorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence {
            message: format!("malformed document: {}", err),
            path: None,
        }
    }
}

/// Result type alias for constructor operations
pub type ConstructorResult<T> = Result<T, ConstructorError>;
