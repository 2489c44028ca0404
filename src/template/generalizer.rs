//! SQL Generalizer - concrete SQL to a placeholder template
//!
//! Passes run in a fixed order; later passes only see what earlier ones left
//! as literals. Comparisons against zero on `delta_*` columns and decimal
//! constants are part of a query's meaning and stay verbatim.

use regex::{Captures, Regex};
use std::sync::LazyLock;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect(stringify!($name)));
    };
}

pattern!(DATE_LITERAL, r"'(\d{4}-\d{2}-\d{2})'");
pattern!(BETWEEN_DATES, r"(?i)(BETWEEN\s+)'\{DATE\}'(\s+AND\s+)'\{DATE\}'");
pattern!(YEAR_EQ, r"(?i)(EXTRACT\s*\(\s*YEAR\s+FROM\s+[\w.]+\s*\)\s*=\s*)(\d{4})\b");
pattern!(MONTH_EQ, r"(?i)(EXTRACT\s*\(\s*MONTH\s+FROM\s+[\w.]+\s*\)\s*=\s*)(\d{1,2})\b");
pattern!(
    HOUR_BETWEEN,
    r"(?i)(EXTRACT\s*\(\s*HOUR\s+FROM\s+[\w.]+\s*\)\s+BETWEEN\s+)(\d{1,2})(\s+AND\s+)(\d{1,2})\b"
);
pattern!(HOUR_FROM, r"(?i)(EXTRACT\s*\(\s*HOUR\s+FROM\s+[\w.]+\s*\)\s*>=\s*)(\d{1,2})\b");
pattern!(HOUR_UNTIL, r"(?i)(EXTRACT\s*\(\s*HOUR\s+FROM\s+[\w.]+\s*\)\s*<\s*)(\d{1,2})\b");
pattern!(NUMBER_BETWEEN, r"(?i)(\bBETWEEN\s+)(\d+)(\s+AND\s+)(\d+)\b");
pattern!(
    COMPARISON,
    r"([\w.]+|\))(\s*)(<=|>=|<>|!=|<|>|=)(\s*)(\d+(?:\.\d+)?)\b"
);
pattern!(DELTA_COLUMN, r"(?i)(?:^|[^\w])delta_\w+");
pattern!(CREATOR_LITERAL, r"'([0-9a-fA-F]{32})'");
pattern!(
    UUID_LITERAL,
    r"(?i)'([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})'"
);

/// Cut everything after the first statement terminator, keeping the terminator.
/// Text is returned untouched when nothing follows the terminator.
pub fn truncate_statement(sql: &str) -> &str {
    match sql.find(';') {
        Some(idx) if !sql[idx + 1..].trim().is_empty() => &sql[..=idx],
        _ => sql,
    }
}

/// SQL generalizer
#[derive(Debug, Clone, Default)]
pub struct SqlGeneralizer;

impl SqlGeneralizer {
    pub fn new() -> Self {
        Self
    }

    /// Turn concrete SQL into a template
    pub fn generalize(&self, sql: &str) -> String {
        let sql = truncate_statement(sql);

        let template = generalize_dates(sql);
        let template = YEAR_EQ.replace_all(&template, "${1}{YEAR}");
        let template = MONTH_EQ.replace_all(&template, "${1}{MONTH}");

        let template = HOUR_BETWEEN.replace_all(&template, "${1}{HOUR1}${3}{HOUR2}");
        let template = HOUR_FROM.replace_all(&template, "${1}{HOUR1}");
        let template = HOUR_UNTIL.replace_all(&template, "${1}{HOUR2}");
        let template = NUMBER_BETWEEN.replace_all(&template, "${1}{NUMBER1}${3}{NUMBER2}");

        let source = template.as_ref();
        let template = COMPARISON.replace_all(source, |caps: &Captures<'_>| {
            // `SUM(delta_x) < 0`: the operand is the call's argument
            let operand = match caps.get(1) {
                Some(m) if m.as_str() == ")" => enclosed(source, m.start()),
                Some(m) => m.as_str(),
                None => "",
            };
            if keeps_literal(operand, &caps[5]) {
                caps[0].to_string()
            } else {
                format!("{}{}{}{}{{NUMBER}}", &caps[1], &caps[2], &caps[3], &caps[4])
            }
        });

        let template = CREATOR_LITERAL.replace_all(&template, "'{ID}'");
        let video_token = if template.contains("{ID}") {
            "'{VIDEO_ID}'"
        } else {
            "'{ID}'"
        };
        let template = UUID_LITERAL.replace_all(&template, video_token).into_owned();

        tracing::debug!(%template, "generalized SQL");
        template
    }
}

/// Generalize with the default generalizer
pub fn generalize_sql(sql: &str) -> String {
    SqlGeneralizer::new().generalize(sql)
}

fn generalize_dates(sql: &str) -> String {
    let literals: Vec<&str> = DATE_LITERAL
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    let template = DATE_LITERAL.replace_all(sql, "'{DATE}'");
    let template = BETWEEN_DATES
        .replace_all(&template, "${1}'{DATE1}'${2}'{DATE2}'")
        .into_owned();

    // Two different bounds outside BETWEEN still form a range
    if literals.len() == 2 && literals[0] != literals[1] && template.matches("'{DATE}'").count() == 2 {
        return template
            .replacen("'{DATE}'", "'{DATE1}'", 1)
            .replacen("'{DATE}'", "'{DATE2}'", 1);
    }
    template
}

/// Text between the `)` at `close` and its matching `(`
fn enclosed(sql: &str, close: usize) -> &str {
    let mut depth = 0usize;
    for (idx, ch) in sql[..close].char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' if depth == 0 => return &sql[idx + 1..close],
            '(' => depth -= 1,
            _ => {}
        }
    }
    ""
}

fn keeps_literal(operand: &str, number: &str) -> bool {
    if number.contains('.') {
        return true;
    }
    number.bytes().all(|b| b == b'0') && DELTA_COLUMN.is_match(operand)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATOR: &str = "0123456789abcdef0123456789abcdef";
    const VIDEO: &str = "123e4567-e89b-12d3-a456-426614174000";

    #[test]
    fn test_single_date() {
        let sql = "SELECT SUM(delta_views_count) FROM video_snapshots WHERE DATE(created_at) = '2025-11-28'";
        assert_eq!(
            generalize_sql(sql),
            "SELECT SUM(delta_views_count) FROM video_snapshots WHERE DATE(created_at) = '{DATE}'"
        );
    }

    #[test]
    fn test_between_dates_and_creator() {
        let sql = format!(
            "SELECT COUNT(*) FROM videos WHERE creator_id = '{CREATOR}' AND DATE(video_created_at) BETWEEN '2025-11-01' AND '2025-11-05'"
        );
        assert_eq!(
            generalize_sql(&sql),
            "SELECT COUNT(*) FROM videos WHERE creator_id = '{ID}' AND DATE(video_created_at) BETWEEN '{DATE1}' AND '{DATE2}'"
        );
    }

    #[test]
    fn test_two_bounds_without_between() {
        let sql = "SELECT COUNT(*) FROM videos WHERE video_created_at >= '2025-11-01' AND video_created_at < '2025-11-05'";
        assert_eq!(
            generalize_sql(sql),
            "SELECT COUNT(*) FROM videos WHERE video_created_at >= '{DATE1}' AND video_created_at < '{DATE2}'"
        );
    }

    #[test]
    fn test_year_and_month() {
        let sql = "SELECT SUM(views_count) FROM videos WHERE EXTRACT(YEAR FROM video_created_at) = 2025 AND EXTRACT(MONTH FROM video_created_at) = 6";
        assert_eq!(
            generalize_sql(sql),
            "SELECT SUM(views_count) FROM videos WHERE EXTRACT(YEAR FROM video_created_at) = {YEAR} AND EXTRACT(MONTH FROM video_created_at) = {MONTH}"
        );
    }

    #[test]
    fn test_numbers_and_delta_zero() {
        let sql = "SELECT COUNT(*) FROM videos WHERE views_count > 100000";
        assert_eq!(
            generalize_sql(sql),
            "SELECT COUNT(*) FROM videos WHERE views_count > {NUMBER}"
        );

        let sql = "SELECT COUNT(DISTINCT video_id) FROM video_snapshots WHERE delta_views_count > 0";
        assert_eq!(generalize_sql(sql), sql);

        let sql = "SELECT COUNT(*) FROM video_snapshots vs WHERE vs.delta_likes_count>0 AND likes_count>=10";
        assert_eq!(
            generalize_sql(sql),
            "SELECT COUNT(*) FROM video_snapshots vs WHERE vs.delta_likes_count>0 AND likes_count>={NUMBER}"
        );
    }

    #[test]
    fn test_delta_zero_inside_aggregate() {
        let sql = "SELECT COUNT(*) FROM (SELECT video_id FROM video_snapshots GROUP BY video_id HAVING SUM(delta_views_count) < 0) t";
        assert_eq!(generalize_sql(sql), sql);

        let sql = "SELECT COUNT(*) FROM video_snapshots WHERE (vs.delta_likes_count) >= 0 AND views_count > 50";
        assert_eq!(
            generalize_sql(sql),
            "SELECT COUNT(*) FROM video_snapshots WHERE (vs.delta_likes_count) >= 0 AND views_count > {NUMBER}"
        );

        // Only a sign check on a delta column is kept
        let sql = "SELECT video_id FROM video_snapshots GROUP BY video_id HAVING SUM(views_count) > 0";
        assert_eq!(
            generalize_sql(sql),
            "SELECT video_id FROM video_snapshots GROUP BY video_id HAVING SUM(views_count) > {NUMBER}"
        );
    }

    #[test]
    fn test_reversed_delta_zero_kept() {
        let sql = "SELECT COUNT(*) FROM video_snapshots WHERE 0 < delta_views_count";
        assert_eq!(generalize_sql(sql), sql);
    }

    #[test]
    fn test_decimal_kept() {
        let sql = "SELECT COUNT(*) FROM videos WHERE likes_count * 1.0 / views_count > 0.05";
        assert_eq!(generalize_sql(sql), sql);
    }

    #[test]
    fn test_hours() {
        let sql = "SELECT SUM(vs.delta_views_count) FROM video_snapshots vs WHERE EXTRACT(HOUR FROM vs.created_at) BETWEEN 10 AND 14";
        assert_eq!(
            generalize_sql(sql),
            "SELECT SUM(vs.delta_views_count) FROM video_snapshots vs WHERE EXTRACT(HOUR FROM vs.created_at) BETWEEN {HOUR1} AND {HOUR2}"
        );

        let sql = "SELECT COUNT(*) FROM video_snapshots WHERE EXTRACT(HOUR FROM created_at) >= 10 AND EXTRACT(HOUR FROM created_at) < 15";
        assert_eq!(
            generalize_sql(sql),
            "SELECT COUNT(*) FROM video_snapshots WHERE EXTRACT(HOUR FROM created_at) >= {HOUR1} AND EXTRACT(HOUR FROM created_at) < {HOUR2}"
        );
    }

    #[test]
    fn test_numeric_between() {
        let sql = "SELECT COUNT(*) FROM videos WHERE views_count BETWEEN 1000 AND 5000";
        assert_eq!(
            generalize_sql(sql),
            "SELECT COUNT(*) FROM videos WHERE views_count BETWEEN {NUMBER1} AND {NUMBER2}"
        );
    }

    #[test]
    fn test_video_id_alone_and_with_creator() {
        let sql = format!("SELECT views_count FROM videos WHERE id = '{VIDEO}'");
        assert_eq!(
            generalize_sql(&sql),
            "SELECT views_count FROM videos WHERE id = '{ID}'"
        );

        let sql = format!("SELECT COUNT(*) FROM videos WHERE creator_id = '{CREATOR}' AND id <> '{VIDEO}'");
        assert_eq!(
            generalize_sql(&sql),
            "SELECT COUNT(*) FROM videos WHERE creator_id = '{ID}' AND id <> '{VIDEO_ID}'"
        );
    }

    #[test]
    fn test_truncates_trailing_statement() {
        let sql = "SELECT COUNT(*) FROM videos; DROP TABLE videos";
        assert_eq!(generalize_sql(sql), "SELECT COUNT(*) FROM videos;");
        assert_eq!(truncate_statement("SELECT 1 FROM videos;"), "SELECT 1 FROM videos;");
        assert_eq!(truncate_statement("SELECT 1 FROM videos;  "), "SELECT 1 FROM videos;  ");
    }

    #[test]
    fn test_idempotent_on_templates() {
        let sql = format!(
            "SELECT COUNT(*) FROM videos WHERE creator_id = '{CREATOR}' AND views_count > 500 AND DATE(video_created_at) = '2025-11-01'"
        );
        let once = generalize_sql(&sql);
        assert_eq!(generalize_sql(&once), once);
    }
}
