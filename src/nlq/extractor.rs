//! Parameter Extractor - concrete values named in a question
//!
//! Recognizers live in one ordered rule table. Rules run by ascending
//! priority; a rule never fires on text an earlier rule already consumed, so
//! the day numbers of a date range are never re-read as free integers.
//! Groups marked first-wins stop after their first valid match.

use crate::nlq::months::month_number;
use regex::{Captures, Regex};
use serde::Serialize;
use std::ops::Range;
use std::sync::LazyLock;

/// Identifier mentioned in a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Identifier {
    /// 32 hex digits
    Creator(String),
    /// UUID-shaped
    Video(String),
}

impl Identifier {
    pub fn value(&self) -> &str {
        match self {
            Self::Creator(id) | Self::Video(id) => id,
        }
    }
}

/// Everything extracted from one question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParameterSet {
    /// ISO dates in order of appearance (range endpoints included)
    pub dates: Vec<String>,
    pub date_range: Option<(String, String)>,
    /// Month mentioned with a year but without a day
    pub year_month: Option<(i32, u32)>,
    /// Free integers in order of appearance
    pub integers: Vec<u64>,
    /// Preferred identifier (phrase-anchored beats bare)
    pub identifier: Option<Identifier>,
    pub creator_id: Option<String>,
    pub video_id: Option<String>,
    /// Hours as written, end exclusive
    pub hour_range: Option<(u32, u32)>,
}

impl ParameterSet {
    /// First date mentioned
    pub fn date(&self) -> Option<&str> {
        self.dates.first().map(String::as_str)
    }

    /// Range start, else the first of two dates
    pub fn date1(&self) -> Option<&str> {
        match &self.date_range {
            Some((start, _)) => Some(start),
            None if self.dates.len() >= 2 => Some(&self.dates[0]),
            None => None,
        }
    }

    /// Range end, else the second of two dates
    pub fn date2(&self) -> Option<&str> {
        match &self.date_range {
            Some((_, end)) => Some(end),
            None => self.dates.get(1).map(String::as_str),
        }
    }

    pub fn year(&self) -> Option<i32> {
        self.year_month.map(|(year, _)| year)
    }

    pub fn month(&self) -> Option<u32> {
        self.year_month.map(|(_, month)| month)
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleGroup {
    DateRange,
    Date,
    MonthYear,
    IsoDate,
    HourRange,
    Identifier,
    Integer,
}

impl RuleGroup {
    fn first_wins(self) -> bool {
        matches!(self, Self::DateRange | Self::MonthYear | Self::HourRange)
    }
}

#[derive(Debug)]
enum Extracted {
    DateRange(String, String),
    Date(String),
    MonthYear(i32, u32),
    HourRange(u32, u32),
    Id(Identifier),
    Integer(u64),
}

struct ExtractionRule {
    priority: u16,
    name: &'static str,
    group: RuleGroup,
    regex: Regex,
    handler: fn(&Captures<'_>) -> Option<Extracted>,
}

impl ExtractionRule {
    fn new(
        priority: u16,
        name: &'static str,
        group: RuleGroup,
        pattern: &str,
        handler: fn(&Captures<'_>) -> Option<Extracted>,
    ) -> Self {
        Self {
            priority,
            name,
            group,
            regex: Regex::new(pattern).unwrap_or_else(|e| panic!("rule {name}: {e}")),
            handler,
        }
    }
}

const UUID: &str = r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}";

static RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    let mut rules = vec![
        // "с 1 ноября 2025 по 5 ноября 2025", "1 ноября 2025 - 5 ноября 2025 года"
        ExtractionRule::new(
            10,
            "date_range_full",
            RuleGroup::DateRange,
            r"(?i)(?:\b(?:с|со|от)\s+)?(\d{1,2})\s+(\p{L}+)\s+(\d{4})(?:\s*г(?:ода|\.)?)?\s*(?:по|до|-|—)\s*(\d{1,2})\s+(\p{L}+)\s+(\d{4})",
            |c| {
                let start = day_month_year(&c[1], &c[2], &c[3])?;
                let end = day_month_year(&c[4], &c[5], &c[6])?;
                Some(Extracted::DateRange(start, end))
            },
        ),
        // "с 28 октября по 3 ноября 2025"
        ExtractionRule::new(
            11,
            "date_range_shared_year",
            RuleGroup::DateRange,
            r"(?i)\b(?:с|со|от)\s+(\d{1,2})\s+(\p{L}+)\s+(?:по|до)\s+(\d{1,2})\s+(\p{L}+)\s+(\d{4})",
            |c| {
                let start = day_month_year(&c[1], &c[2], &c[5])?;
                let end = day_month_year(&c[3], &c[4], &c[5])?;
                Some(Extracted::DateRange(start, end))
            },
        ),
        // "с 1 по 5 ноября 2025"
        ExtractionRule::new(
            12,
            "date_range_shared_month",
            RuleGroup::DateRange,
            r"(?i)\b(?:с|со|от)\s+(\d{1,2})\s+(?:по|до|-|—)\s+(\d{1,2})\s+(\p{L}+)\s+(\d{4})",
            |c| {
                let start = day_month_year(&c[1], &c[3], &c[4])?;
                let end = day_month_year(&c[2], &c[3], &c[4])?;
                Some(Extracted::DateRange(start, end))
            },
        ),
        // "1-5 ноября 2025"
        ExtractionRule::new(
            13,
            "date_range_dashed_days",
            RuleGroup::DateRange,
            r"(?i)\b(\d{1,2})\s*[-—]\s*(\d{1,2})\s+(\p{L}+)\s+(\d{4})",
            |c| {
                let start = day_month_year(&c[1], &c[3], &c[4])?;
                let end = day_month_year(&c[2], &c[3], &c[4])?;
                Some(Extracted::DateRange(start, end))
            },
        ),
        ExtractionRule::new(
            20,
            "date_day_month_year",
            RuleGroup::Date,
            r"(?i)\b(\d{1,2})\s+(\p{L}+)\s+(\d{4})",
            |c| day_month_year(&c[1], &c[2], &c[3]).map(Extracted::Date),
        ),
        // "в июне 2025 года"
        ExtractionRule::new(
            30,
            "month_year",
            RuleGroup::MonthYear,
            r"(?i)\b(\p{L}+)\s+(\d{4})\b",
            |c| {
                let month = month_number(&c[1])?;
                let year: i32 = c[2].parse().ok()?;
                Some(Extracted::MonthYear(year, month))
            },
        ),
        ExtractionRule::new(
            40,
            "iso_date",
            RuleGroup::IsoDate,
            r"\b(\d{4})-(\d{2})-(\d{2})\b",
            |c| {
                let year: i32 = c[1].parse().ok()?;
                let month: u32 = c[2].parse().ok()?;
                let day: u32 = c[3].parse().ok()?;
                iso_date(year, month, day).map(Extracted::Date)
            },
        ),
        // "с 10:00 до 15:00"
        ExtractionRule::new(
            50,
            "hours_clock",
            RuleGroup::HourRange,
            r"(?i)\b(?:с|со|от)\s+(\d{1,2}):\d{2}\s+(?:до|по)\s+(\d{1,2}):\d{2}",
            |c| hours(&c[1], &c[2]),
        ),
        // "между 10 и 15", "между 10:00 и 15:00"
        ExtractionRule::new(
            51,
            "hours_between",
            RuleGroup::HourRange,
            r"(?i)\bмежду\s+(\d{1,2})(?::\d{2})?\s+и\s+(\d{1,2})(?::\d{2})?",
            |c| hours(&c[1], &c[2]),
        ),
        // "с 10 до 15 часов"
        ExtractionRule::new(
            52,
            "hours_spoken",
            RuleGroup::HourRange,
            r"(?i)\b(?:с|со|от)\s+(\d{1,2})\s+(?:до|по)\s+(\d{1,2})\s+час",
            |c| hours(&c[1], &c[2]),
        ),
        // "10:00-15:00"
        ExtractionRule::new(
            53,
            "hours_dashed",
            RuleGroup::HourRange,
            r"\b(\d{1,2}):\d{2}\s*[-—]\s*(\d{1,2}):\d{2}",
            |c| hours(&c[1], &c[2]),
        ),
        ExtractionRule::new(
            60,
            "creator_id_anchored",
            RuleGroup::Identifier,
            r"(?i)креатор\p{L}*\s+(?:с\s+)?(?:id\s+)?([0-9a-f]{32})\b",
            |c| Some(Extracted::Id(Identifier::Creator(c[1].to_lowercase()))),
        ),
        ExtractionRule::new(
            61,
            "video_id_anchored",
            RuleGroup::Identifier,
            &format!(r"(?i)\bid\s*[:=]?\s*({UUID})\b"),
            |c| Some(Extracted::Id(Identifier::Video(c[1].to_lowercase()))),
        ),
        ExtractionRule::new(
            62,
            "creator_id_after_id",
            RuleGroup::Identifier,
            r"(?i)\bid\s*[:=]?\s*([0-9a-f]{32})\b",
            |c| Some(Extracted::Id(Identifier::Creator(c[1].to_lowercase()))),
        ),
        ExtractionRule::new(
            63,
            "creator_id_bare",
            RuleGroup::Identifier,
            r"(?i)\b([0-9a-f]{32})\b",
            |c| Some(Extracted::Id(Identifier::Creator(c[1].to_lowercase()))),
        ),
        ExtractionRule::new(
            64,
            "video_id_bare",
            RuleGroup::Identifier,
            &format!(r"(?i)\b({UUID})\b"),
            |c| Some(Extracted::Id(Identifier::Video(c[1].to_lowercase()))),
        ),
        ExtractionRule::new(70, "integer", RuleGroup::Integer, r"\b(\d+)\b", |c| {
            c[1].parse().ok().map(Extracted::Integer)
        }),
    ];
    rules.sort_by_key(|rule| rule.priority);
    rules
});

fn day_month_year(day: &str, month_word: &str, year: &str) -> Option<String> {
    let day: u32 = day.parse().ok()?;
    let month = month_number(month_word)?;
    let year: i32 = year.parse().ok()?;
    iso_date(year, month, day)
}

fn iso_date(year: i32, month: u32, day: u32) -> Option<String> {
    let max_day = match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        1..=12 => 31,
        _ => return None,
    };
    if day == 0 || day > max_day {
        return None;
    }
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

fn hours(start: &str, end: &str) -> Option<Extracted> {
    let start: u32 = start.parse().ok()?;
    let end: u32 = end.parse().ok()?;
    (start <= 24 && end <= 24).then_some(Extracted::HourRange(start, end))
}

fn overlaps(consumed: &[Range<usize>], span: &Range<usize>) -> bool {
    consumed
        .iter()
        .any(|taken| taken.start < span.end && span.start < taken.end)
}

/// Parameter extractor over the built-in rule table
#[derive(Debug, Clone, Default)]
pub struct ParameterExtractor;

impl ParameterExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every recognized value from the raw question text
    pub fn extract(&self, text: &str) -> ParameterSet {
        let mut params = ParameterSet::default();
        let mut consumed: Vec<Range<usize>> = Vec::new();
        let mut dates: Vec<(usize, String)> = Vec::new();
        let mut settled: Vec<RuleGroup> = Vec::new();

        for rule in RULES.iter() {
            if rule.group.first_wins() && settled.contains(&rule.group) {
                continue;
            }

            for caps in rule.regex.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                let span = whole.range();
                if overlaps(&consumed, &span) {
                    continue;
                }
                let Some(value) = (rule.handler)(&caps) else {
                    continue;
                };

                tracing::debug!(rule = rule.name, matched = whole.as_str(), "extraction rule fired");
                consumed.push(span.clone());

                match value {
                    Extracted::DateRange(start, end) => {
                        dates.push((span.start, start.clone()));
                        dates.push((span.start + 1, end.clone()));
                        params.date_range = Some((start, end));
                    }
                    Extracted::Date(date) => dates.push((span.start, date)),
                    Extracted::MonthYear(year, month) => params.year_month = Some((year, month)),
                    Extracted::HourRange(start, end) => params.hour_range = Some((start, end)),
                    Extracted::Id(identifier) => {
                        match &identifier {
                            Identifier::Creator(id) => {
                                params.creator_id.get_or_insert_with(|| id.clone());
                            }
                            Identifier::Video(id) => {
                                params.video_id.get_or_insert_with(|| id.clone());
                            }
                        }
                        params.identifier.get_or_insert(identifier);
                    }
                    Extracted::Integer(n) => params.integers.push(n),
                }

                if rule.group.first_wins() {
                    settled.push(rule.group);
                    break;
                }
            }
        }

        dates.sort_by_key(|(pos, _)| *pos);
        params.dates = dates.into_iter().map(|(_, date)| date).collect();
        params
    }
}

/// Extract with the default extractor
pub fn extract_parameters(text: &str) -> ParameterSet {
    ParameterExtractor::new().extract(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATOR: &str = "0123456789abcdef0123456789abcdef";
    const VIDEO: &str = "123e4567-e89b-12d3-a456-426614174000";

    #[test]
    fn test_shared_month_range() {
        let params = extract_parameters("Сколько видео вышло с 1 по 5 ноября 2025?");
        assert_eq!(
            params.date_range,
            Some(("2025-11-01".to_string(), "2025-11-05".to_string()))
        );
        assert_eq!(params.date1(), Some("2025-11-01"));
        assert_eq!(params.date2(), Some("2025-11-05"));
        // Day numbers belong to the range, not to the integer list
        assert!(params.integers.is_empty());
    }

    #[test]
    fn test_full_range_with_years() {
        let params = extract_parameters("с 1 ноября 2025 года по 5 декабря 2025 года");
        assert_eq!(
            params.date_range,
            Some(("2025-11-01".to_string(), "2025-12-05".to_string()))
        );
        assert!(params.year_month.is_none());
    }

    #[test]
    fn test_shared_year_range() {
        let params = extract_parameters("с 28 октября по 3 ноября 2025");
        assert_eq!(
            params.date_range,
            Some(("2025-10-28".to_string(), "2025-11-03".to_string()))
        );
    }

    #[test]
    fn test_single_date() {
        let params = extract_parameters("Сколько просмотров набрали видео 28 ноября 2025?");
        assert_eq!(params.dates, vec!["2025-11-28".to_string()]);
        assert_eq!(params.date(), Some("2025-11-28"));
        assert!(params.date_range.is_none());
        assert!(params.integers.is_empty());
    }

    #[test]
    fn test_iso_date_passthrough() {
        let params = extract_parameters("Прирост за 2025-11-27");
        assert_eq!(params.date(), Some("2025-11-27"));
        assert!(params.integers.is_empty());
    }

    #[test]
    fn test_invalid_date_is_ignored() {
        let params = extract_parameters("видео 31 ноября 2025");
        assert!(params.dates.is_empty());
    }

    #[test]
    fn test_month_year() {
        let params = extract_parameters("Сколько просмотров у видео, опубликованных в июне 2025 года?");
        assert_eq!(params.year_month, Some((2025, 6)));
        assert_eq!(params.year(), Some(2025));
        assert_eq!(params.month(), Some(6));
        assert!(params.integers.is_empty());
    }

    #[test]
    fn test_hour_ranges() {
        let params = extract_parameters("прирост с 10:00 до 15:00");
        assert_eq!(params.hour_range, Some((10, 15)));
        assert!(params.integers.is_empty());

        let params = extract_parameters("между 8 и 12");
        assert_eq!(params.hour_range, Some((8, 12)));

        let params = extract_parameters("с 9 до 18 часов");
        assert_eq!(params.hour_range, Some((9, 18)));
    }

    #[test]
    fn test_anchored_creator_id_preferred() {
        let text = format!("видео {VIDEO} у креатора с id {CREATOR}");
        let params = extract_parameters(&text);
        assert_eq!(params.identifier, Some(Identifier::Creator(CREATOR.to_string())));
        assert_eq!(params.creator_id.as_deref(), Some(CREATOR));
        assert_eq!(params.video_id.as_deref(), Some(VIDEO));
    }

    #[test]
    fn test_bare_uuid() {
        let params = extract_parameters(&format!("прирост видео {VIDEO}"));
        assert_eq!(params.identifier, Some(Identifier::Video(VIDEO.to_string())));
        assert!(params.integers.is_empty());
    }

    #[test]
    fn test_uppercase_id_is_lowered() {
        let params = extract_parameters(&format!("креатор {}", CREATOR.to_uppercase()));
        assert_eq!(params.creator_id.as_deref(), Some(CREATOR));
    }

    #[test]
    fn test_integers_in_order() {
        let params = extract_parameters("больше 100000 просмотров и 50 лайков");
        assert_eq!(params.integers, vec![100000, 50]);
    }

    #[test]
    fn test_combined_question() {
        let text = format!("Сколько видео у креатора с id {CREATOR} вышло с 1 по 5 ноября 2025?");
        let params = extract_parameters(&text);
        assert_eq!(params.creator_id.as_deref(), Some(CREATOR));
        assert_eq!(params.date1(), Some("2025-11-01"));
        assert_eq!(params.date2(), Some("2025-11-05"));
        assert!(params.integers.is_empty());
    }

    #[test]
    fn test_nothing_to_extract() {
        assert!(extract_parameters("Сколько всего видео?").is_empty());
    }

    #[test]
    fn test_rules_sorted() {
        let priorities: Vec<u16> = RULES.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
    }
}
