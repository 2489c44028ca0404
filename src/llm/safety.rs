//! SQL Safety - deterministic checks on generated SQL before it is returned or learned

use regex::Regex;
use std::sync::LazyLock;

/// Statements a read-only analytics query never needs
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
];

static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"))).expect("forbidden keyword pattern")
});
static SELECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSELECT\b").expect("select pattern"));
static FROM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bFROM\b").expect("from pattern"));
static AGGREGATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(COUNT|SUM|AVG|MIN|MAX)\s*\(").expect("aggregate pattern"));

/// Safety verdict
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SafetyVerdict {
    Safe,
    Unsafe { reason: String },
}

impl SafetyVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

/// SQL Safety Validator - read-only, single-statement, well-formed aggregates
#[derive(Debug, Clone, Default)]
pub struct SqlSafetyValidator;

impl SqlSafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate generated SQL
    pub fn validate(&self, sql: &str) -> SafetyVerdict {
        let checks: [fn(&str) -> Result<(), String>; 5] = [
            check_not_empty,
            check_no_comments,
            check_single_statement,
            check_read_only,
            check_aggregates,
        ];

        for check in checks {
            if let Err(reason) = check(sql) {
                tracing::warn!(%reason, "generated SQL rejected");
                return SafetyVerdict::Unsafe { reason };
            }
        }
        SafetyVerdict::Safe
    }
}

fn check_not_empty(sql: &str) -> Result<(), String> {
    if sql.trim().is_empty() {
        return Err("empty statement".to_string());
    }
    Ok(())
}

fn check_no_comments(sql: &str) -> Result<(), String> {
    if sql.contains("--") || sql.contains("/*") {
        return Err("comment markers are not allowed".to_string());
    }
    Ok(())
}

fn check_single_statement(sql: &str) -> Result<(), String> {
    let body = sql.trim().trim_end_matches(';');
    if body.contains(';') {
        return Err("multiple statements".to_string());
    }
    Ok(())
}

fn check_read_only(sql: &str) -> Result<(), String> {
    if let Some(found) = FORBIDDEN.find(sql) {
        return Err(format!("forbidden keyword {}", found.as_str().to_uppercase()));
    }
    if !SELECT.is_match(sql) || !FROM.is_match(sql) {
        return Err("not a SELECT ... FROM query".to_string());
    }
    Ok(())
}

/// COUNT(COUNT(...)) and the like: an aggregate directly or indirectly inside itself
fn check_aggregates(sql: &str) -> Result<(), String> {
    for caps in AGGREGATE.captures_iter(sql) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let inner = enclosed(sql, whole.end());
        let nested = AGGREGATE
            .captures_iter(inner)
            .filter_map(|c| c.get(1))
            .any(|m| m.as_str().eq_ignore_ascii_case(name.as_str()));
        if nested {
            return Err(format!("nested {} aggregate", name.as_str().to_uppercase()));
        }
    }
    Ok(())
}

/// Text between an opening parenthesis (ending at `start`) and its match
fn enclosed(sql: &str, start: usize) -> &str {
    let mut depth = 1usize;
    for (offset, ch) in sql[start..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return &sql[start..start + offset];
                }
            }
            _ => {}
        }
    }
    &sql[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safe(sql: &str) -> bool {
        SqlSafetyValidator::new().validate(sql).is_safe()
    }

    #[test]
    fn test_plain_select_is_safe() {
        assert!(safe("SELECT COUNT(*) FROM videos"));
        assert!(safe("SELECT SUM(delta_views_count) FROM video_snapshots WHERE DATE(created_at) = '2025-11-28';"));
        assert!(safe("select count(distinct video_id) from video_snapshots where updated_at is not null"));
    }

    #[test]
    fn test_mutations_rejected() {
        assert!(!safe("DROP TABLE videos"));
        assert!(!safe("DELETE FROM videos"));
        assert!(!safe("SELECT 1 FROM videos; UPDATE videos SET views_count = 0"));
        assert!(!safe("insert into videos select * from videos"));
    }

    #[test]
    fn test_comments_and_statements() {
        assert!(!safe("SELECT COUNT(*) FROM videos -- all"));
        assert!(!safe("SELECT /* x */ COUNT(*) FROM videos"));
        assert!(!safe("SELECT 1 FROM videos; SELECT 2 FROM videos"));
    }

    #[test]
    fn test_requires_select_from() {
        assert!(!safe("SELECT 1"));
        assert!(!safe(""));
        assert!(!safe("   "));
    }

    #[test]
    fn test_nested_aggregate() {
        assert!(!safe("SELECT COUNT(COUNT(*)) FROM videos"));
        assert!(!safe("SELECT SUM(views_count + SUM(likes_count)) FROM videos"));
        assert!(safe("SELECT SUM(views_count) / COUNT(*) FROM videos"));
        assert!(safe("SELECT MAX(views_count) - MIN(views_count) FROM videos"));
    }
}
