//! Normalizer - question text to an unordered set of meaningful words
//!
//! Identifiers are swapped for marker tokens before digits are stripped, so a
//! hex creator id or a UUID never decays into stray numbers. Month names become
//! one marker, so a pattern learned for November also serves December. Bare
//! numbers and ISO dates are dropped here; the parameter extractor reads them
//! from the raw text.

use crate::nlq::months::month_number;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Normalized, deduplicated, sorted word set of one question
pub type WordSet = BTreeSet<String>;

/// Marker standing in for a 32-hex-digit creator id
pub const CREATOR_ID_MARKER: &str = "IDCREATOR";

/// Marker standing in for a UUID-shaped video id
pub const VIDEO_ID_MARKER: &str = "IDVIDEO";

/// Marker standing in for any month name, in any grammatical form
pub const MONTH_MARKER: &str = "MONTHNAME";

/// Words that carry no pattern meaning
pub const STOP_WORDS: &[&str] = &[
    "и", "в", "с", "по", "за", "у", "о", "от", "есть", "всего", "x", "id",
];

/// Tokens shorter than this (in characters) are dropped
pub const MIN_WORD_CHARS: usize = 3;

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("uuid pattern")
});
static HEX_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-f]{32}\b").expect("hex id pattern"));
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("iso date pattern"));
static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\b").expect("number pattern"));

/// Question normalizer
#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize raw question text into its word set
    pub fn normalize(&self, text: &str) -> WordSet {
        let lower = text.to_lowercase();
        let clean = lower.replace(['?', '.', ','], " ");

        // Identifiers first: UUIDs contain short digit runs that the number
        // stripping below would otherwise tear out.
        let clean = UUID.replace_all(&clean, format!(" {VIDEO_ID_MARKER} ").as_str());
        let clean = HEX_ID.replace_all(&clean, format!(" {CREATOR_ID_MARKER} ").as_str());

        let clean = ISO_DATE.replace_all(&clean, " ");
        let clean = BARE_NUMBER.replace_all(&clean, " ");

        let words: WordSet = clean
            .split_whitespace()
            .filter(|word| !STOP_WORDS.contains(word))
            .filter(|word| word.chars().count() >= MIN_WORD_CHARS)
            .map(|word| match month_number(word) {
                Some(_) => MONTH_MARKER.to_string(),
                None => word.to_string(),
            })
            .collect();

        tracing::debug!(?words, "normalized question");
        words
    }
}

/// Normalize with the default normalizer
pub fn normalize(text: &str) -> WordSet {
    Normalizer::new().normalize(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> WordSet {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_basic_question() {
        assert_eq!(normalize("Сколько всего видео?"), set(&["сколько", "видео"]));
    }

    #[test]
    fn test_word_order_does_not_matter() {
        assert_eq!(normalize("Видео сколько всего?"), normalize("Сколько всего видео?"));
    }

    #[test]
    fn test_creator_id_is_protected() {
        let words = normalize(
            "Сколько видео у креатора с id 0123456789abcdef0123456789abcdef вышло с 1 по 5 ноября 2025?",
        );
        assert_eq!(
            words,
            set(&["сколько", "видео", "креатора", CREATOR_ID_MARKER, "вышло", MONTH_MARKER])
        );
    }

    #[test]
    fn test_uuid_is_protected() {
        let words = normalize("Прирост просмотров видео 123e4567-e89b-12d3-a456-426614174000");
        assert!(words.contains(VIDEO_ID_MARKER));
        assert!(!words.iter().any(|w| w.contains("e89b")));
    }

    #[test]
    fn test_numbers_and_iso_dates_are_stripped() {
        let words = normalize("На сколько просмотров выросли все видео 2025-11-28 к 10:00?");
        assert_eq!(words, set(&["сколько", "просмотров", "выросли", "все", "видео"]));
    }

    #[test]
    fn test_long_numbers_are_stripped() {
        assert_eq!(normalize("больше 100000 просмотров"), normalize("больше 1000 просмотров"));
        assert!(!normalize("больше 100000 просмотров").contains("100000"));
    }

    #[test]
    fn test_month_names_share_one_marker() {
        assert_eq!(
            normalize("видео, опубликованные в июне 2025 года"),
            normalize("видео, опубликованные в июле 2025 года")
        );
        assert_eq!(
            normalize("вышло с 1 по 5 ноября 2025"),
            set(&["вышло", MONTH_MARKER])
        );
        assert!(!normalize("Сколько всего видео?").contains(MONTH_MARKER));
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize("").is_empty());
        assert!(normalize("? , .").is_empty());
    }
}
