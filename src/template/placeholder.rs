//! Placeholder vocabulary for SQL templates
//!
//! A template token is `{NAME}`. The set of names is closed; anything else in
//! braces makes the template unusable.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z][A-Za-z0-9_]*)\}").expect("placeholder token pattern"));

/// A named slot in a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Placeholder {
    Date,
    Date1,
    Date2,
    /// Creator id, or the only identifier of the template
    Id,
    VideoId,
    /// Next unused free integer
    Number,
    /// n-th free integer of the question (1-based)
    NumberN(usize),
    Year,
    Month,
    Hour1,
    Hour2,
}

impl Placeholder {
    /// Parse a placeholder name (without braces)
    pub fn parse(name: &str) -> Option<Self> {
        let placeholder = match name {
            "DATE" => Self::Date,
            "DATE1" => Self::Date1,
            "DATE2" => Self::Date2,
            "ID" => Self::Id,
            "VIDEO_ID" => Self::VideoId,
            "NUMBER" => Self::Number,
            "YEAR" => Self::Year,
            "MONTH" => Self::Month,
            "HOUR1" => Self::Hour1,
            "HOUR2" => Self::Hour2,
            other => {
                let digits = other.strip_prefix("NUMBER")?;
                let digits = digits.strip_prefix('_').unwrap_or(digits);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let n: usize = digits.parse().ok()?;
                if n == 0 {
                    return None;
                }
                Self::NumberN(n)
            }
        };
        Some(placeholder)
    }

    /// Canonical name without braces
    pub fn name(&self) -> String {
        match self {
            Self::Date => "DATE".to_string(),
            Self::Date1 => "DATE1".to_string(),
            Self::Date2 => "DATE2".to_string(),
            Self::Id => "ID".to_string(),
            Self::VideoId => "VIDEO_ID".to_string(),
            Self::Number => "NUMBER".to_string(),
            Self::NumberN(n) => format!("NUMBER{n}"),
            Self::Year => "YEAR".to_string(),
            Self::Month => "MONTH".to_string(),
            Self::Hour1 => "HOUR1".to_string(),
            Self::Hour2 => "HOUR2".to_string(),
        }
    }

    /// Canonical token as it appears in a template
    pub fn token(&self) -> String {
        format!("{{{}}}", self.name())
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// One `{NAME}` occurrence in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRef {
    /// Exact text, braces included
    pub text: String,
    /// None when the name is outside the vocabulary
    pub placeholder: Option<Placeholder>,
}

/// All placeholder-shaped tokens in order of appearance
pub fn scan(template: &str) -> Vec<TokenRef> {
    TOKEN
        .captures_iter(template)
        .map(|caps| TokenRef {
            text: caps[0].to_string(),
            placeholder: Placeholder::parse(&caps[1]),
        })
        .collect()
}

/// Whether the text carries any placeholder-shaped token, known or not
pub fn has_placeholders(text: &str) -> bool {
    TOKEN.is_match(text)
}

/// Distinct tokens whose names are outside the vocabulary
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    for token in scan(template) {
        if token.placeholder.is_none() && !unknown.contains(&token.text) {
            unknown.push(token.text);
        }
    }
    unknown
}

/// Distinct tokens still present in the text, in order of first appearance
pub fn remaining_tokens(text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for token in scan(text) {
        if !seen.contains(&token.text) {
            seen.push(token.text);
        }
    }
    seen
}
