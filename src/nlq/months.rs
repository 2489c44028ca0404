//! Month-name lookup
//!
//! Covers the nominative ("ноябрь"), genitive ("ноября") and prepositional
//! ("ноябре") forms, case-insensitively.

const MONTH_FORMS: [(&str, &str, &str); 12] = [
    ("январь", "января", "январе"),
    ("февраль", "февраля", "феврале"),
    ("март", "марта", "марте"),
    ("апрель", "апреля", "апреле"),
    ("май", "мая", "мае"),
    ("июнь", "июня", "июне"),
    ("июль", "июля", "июле"),
    ("август", "августа", "августе"),
    ("сентябрь", "сентября", "сентябре"),
    ("октябрь", "октября", "октябре"),
    ("ноябрь", "ноября", "ноябре"),
    ("декабрь", "декабря", "декабре"),
];

/// Month number (1-12) for any grammatical form of a month name
pub fn month_number(word: &str) -> Option<u32> {
    let lower = word.to_lowercase();
    MONTH_FORMS
        .iter()
        .position(|(nominative, genitive, prepositional)| {
            lower == *nominative || lower == *genitive || lower == *prepositional
        })
        .map(|idx| idx as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_forms() {
        assert_eq!(month_number("январь"), Some(1));
        assert_eq!(month_number("ноября"), Some(11));
        assert_eq!(month_number("июне"), Some(6));
        assert_eq!(month_number("декабре"), Some(12));
        assert_eq!(month_number("мая"), Some(5));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(month_number("НОЯБРЯ"), Some(11));
        assert_eq!(month_number("Июне"), Some(6));
    }

    #[test]
    fn test_unknown_word() {
        assert_eq!(month_number("просмотров"), None);
        assert_eq!(month_number("видео"), None);
        assert_eq!(month_number("марте"), Some(3));
    }
}
