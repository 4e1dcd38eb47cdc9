use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::member::MemberRecord;

lazy_static! {
    static ref BIRTH_DATE_REGEX: Regex =
        Regex::new(r"^([0-9]{4})[-./]?([0-9]{2})[-./]?([0-9]{2})$").unwrap();
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

/// Cell values that mean "nothing here" when they come back from the sheet.
const EMPTY_SENTINELS: [&str; 4] = ["nan", "None", "NaT", "null"];

/// Names that only ever appear when a header row was imported as data.
const HEADER_WORDS: [&str; 6] = ["name", "이름", "성명", "번호", "no", "no."];

/// Trims a cell and collapses the empty sentinels to `""`.
pub fn clean_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    if EMPTY_SENTINELS.contains(&trimmed) {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Formats a phone number holding exactly 10 or 11 digits.
///
/// Only digits and common separators are accepted; anything else (letters,
/// extensions, a different digit count) is returned unchanged.
///
/// # Examples
/// ```
/// use roster::normalize::normalize_phone;
///
/// assert_eq!(normalize_phone("4165551234"), "416-555-1234");
/// assert_eq!(normalize_phone("010 1234 5678"), "010-1234-5678");
/// assert_eq!(normalize_phone("ext. 12"), "ext. 12");
/// ```
pub fn normalize_phone(raw: &str) -> String {
    let separators_only = raw
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '.' | '(' | ')' | '+'));
    if !separators_only {
        return raw.to_string();
    }

    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 => format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..]),
        _ => raw.to_string(),
    }
}

/// Normalizes `YYYYMMDD` (or an already separated form) to `YYYY-MM-DD`.
///
/// Anything that is not a real calendar date becomes `""`.
pub fn normalize_birth_date(raw: &str) -> String {
    let Some(caps) = BIRTH_DATE_REGEX.captures(raw.trim()) else {
        return String::new();
    };
    let parts = (
        caps[1].parse::<i32>(),
        caps[2].parse::<u32>(),
        caps[3].parse::<u32>(),
    );
    match parts {
        (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// True when `name` is really a header word, i.e. a duplicated header row
/// was ingested as data.
pub fn is_header_leak(name: &str) -> bool {
    let compact = WHITESPACE_REGEX.replace_all(name, "").to_lowercase();
    HEADER_WORDS.contains(&compact.as_str())
}

/// Applies every cell rule to a record.
pub fn normalize_record(record: &MemberRecord) -> MemberRecord {
    MemberRecord::from_cells(|column| record.cell(column).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::Column;
    use proptest::prelude::*;

    #[test]
    fn sentinels_collapse_to_empty() {
        for raw in ["nan", " None ", "NaT", "null", "", "   "] {
            assert_eq!(clean_cell(raw), "", "{:?} should be empty", raw);
        }
        assert_eq!(clean_cell(" Nat "), "Nat");
        assert_eq!(clean_cell("nancy"), "nancy");
    }

    #[test]
    fn phone_formats_ten_and_eleven_digits() {
        assert_eq!(normalize_phone("4165551234"), "416-555-1234");
        assert_eq!(normalize_phone("(416) 555.1234"), "416-555-1234");
        assert_eq!(normalize_phone("14165551234"), "141-6555-1234");
        assert_eq!(normalize_phone("01012345678"), "010-1234-5678");
    }

    #[test]
    fn phone_leaves_other_input_alone() {
        assert_eq!(normalize_phone("416555123"), "416555123");
        assert_eq!(normalize_phone("416-555-1234 ext 5"), "416-555-1234 ext 5");
        assert_eq!(normalize_phone("call office"), "call office");
        assert_eq!(normalize_phone(""), "");
    }

    #[test]
    fn birth_dates_normalize_or_empty() {
        assert_eq!(normalize_birth_date("19800501"), "1980-05-01");
        assert_eq!(normalize_birth_date("1980-05-01"), "1980-05-01");
        assert_eq!(normalize_birth_date("1980.5.1"), "");
        assert_eq!(normalize_birth_date("19801301"), "");
        assert_eq!(normalize_birth_date("19800230"), "");
        assert_eq!(normalize_birth_date(""), "");
        assert_eq!(normalize_birth_date("sometime in May"), "");
    }

    #[test]
    fn header_words_are_detected() {
        assert!(is_header_leak("이 름"));
        assert!(is_header_leak(" Name "));
        assert!(is_header_leak("번호"));
        assert!(!is_header_leak("Namesake"));
        assert!(!is_header_leak("김이름"));
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(cells in proptest::collection::vec(".{0,16}", Column::ALL.len())) {
            let raw = MemberRecord::from_cells(|column| {
                let index = Column::ALL.iter().position(|c| *c == column).unwrap();
                cells[index].clone()
            });
            let once = normalize_record(&raw);
            let twice = normalize_record(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn digit_strings_normalize_once(digits in "[0-9]{10,11}") {
            let once = normalize_phone(&digits);
            prop_assert_eq!(normalize_phone(&once), once.clone());
            prop_assert_ne!(once, digits);
        }
    }
}
