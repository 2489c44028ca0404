//! Template Filler - substitute a question's values into a template
//!
//! Fills in a fixed order (semantic slots, numbered numbers, identifiers,
//! hours, then generic numbers). Output with any placeholder left is refused.

use crate::error::{ConstructorError, ConstructorResult};
use crate::nlq::extractor::{ParameterExtractor, ParameterSet};
use crate::template::placeholder::{remaining_tokens, scan, unknown_placeholders, Placeholder};
use regex::Regex;
use std::sync::LazyLock;

static HOUR_BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(BETWEEN\s+)\{HOUR1\}(\s+AND\s+)\{HOUR2\}").expect("hour between pattern")
});

/// Value used for a generic {NUMBER} when the question has no integer left
pub const FALLBACK_NUMBER: &str = "0";

/// Template filler
#[derive(Debug, Clone, Default)]
pub struct TemplateFiller {
    extractor: ParameterExtractor,
}

impl TemplateFiller {
    pub fn new() -> Self {
        Self {
            extractor: ParameterExtractor::new(),
        }
    }

    /// Extract parameters from the question and fill the template
    pub fn fill(&self, template: &str, query: &str) -> ConstructorResult<String> {
        let params = self.extractor.extract(query);
        self.fill_with(template, &params)
    }

    /// Fill the template from already extracted parameters
    pub fn fill_with(&self, template: &str, params: &ParameterSet) -> ConstructorResult<String> {
        let unknown = unknown_placeholders(template);
        if !unknown.is_empty() {
            tracing::warn!(?unknown, "template carries unknown placeholders");
            return Err(ConstructorError::unresolved(unknown));
        }

        let mut sql = template.to_string();

        // 1. Dates, year and month
        let semantic: [(Placeholder, Option<String>); 5] = [
            (Placeholder::Date1, params.date1().map(str::to_string)),
            (Placeholder::Date2, params.date2().map(str::to_string)),
            (Placeholder::Date, params.date().map(str::to_string)),
            (Placeholder::Year, params.year().map(|y| y.to_string())),
            (Placeholder::Month, params.month().map(|m| m.to_string())),
        ];
        for (placeholder, value) in semantic {
            sql = substitute(sql, placeholder, value.as_deref());
        }

        // 2. Numbered integers
        let mut used = vec![false; params.integers.len()];
        let numbered: Vec<usize> = scan(&sql)
            .into_iter()
            .filter_map(|token| match token.placeholder {
                Some(Placeholder::NumberN(n)) => Some(n),
                _ => None,
            })
            .collect();
        for n in numbered {
            let value = params.integers.get(n - 1).map(|v| {
                used[n - 1] = true;
                v.to_string()
            });
            sql = substitute_token(sql, &format!("{{NUMBER{n}}}"), value.as_deref());
            sql = substitute_token(sql, &format!("{{NUMBER_{n}}}"), value.as_deref());
        }

        // 3. Identifiers
        let id_value = if sql.contains(&Placeholder::VideoId.token()) {
            params.creator_id.clone()
        } else {
            params.identifier.as_ref().map(|id| id.value().to_string())
        };
        sql = substitute(sql, Placeholder::Id, id_value.as_deref());
        sql = substitute(sql, Placeholder::VideoId, params.video_id.as_deref());

        // 4. Hours; BETWEEN is inclusive while the question's end hour is not
        if let Some((start, end)) = params.hour_range {
            let last = end.saturating_sub(1);
            sql = HOUR_BETWEEN
                .replace_all(&sql, format!("${{1}}{start}${{2}}{last}").as_str())
                .into_owned();
            sql = substitute(sql, Placeholder::Hour1, Some(&start.to_string()));
            sql = substitute(sql, Placeholder::Hour2, Some(&end.to_string()));
        }

        // 5. Generic numbers take what is left, in order
        let generic = Placeholder::Number.token();
        let mut remaining = params
            .integers
            .iter()
            .zip(used.iter())
            .filter(|(_, used)| !**used)
            .map(|(value, _)| value.to_string());
        while sql.contains(&generic) {
            let value = remaining.next().unwrap_or_else(|| FALLBACK_NUMBER.to_string());
            sql = sql.replacen(&generic, &value, 1);
        }

        // 6. Nothing may be left
        let left = remaining_tokens(&sql);
        if !left.is_empty() {
            tracing::warn!(?left, "template not fully resolved");
            return Err(ConstructorError::unresolved(left));
        }

        Ok(sql)
    }
}

fn substitute(sql: String, placeholder: Placeholder, value: Option<&str>) -> String {
    substitute_token(sql, &placeholder.token(), value)
}

fn substitute_token(sql: String, token: &str, value: Option<&str>) -> String {
    if !sql.contains(token) {
        return sql;
    }
    match value {
        Some(value) => {
            tracing::debug!(token, value, "placeholder resolved");
            sql.replace(token, value)
        }
        None => {
            tracing::debug!(token, "no value extracted for placeholder");
            sql
        }
    }
}

/// Fill with the default filler
pub fn fill_template(template: &str, query: &str) -> ConstructorResult<String> {
    TemplateFiller::new().fill(template, query)
}
