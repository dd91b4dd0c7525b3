use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use time::format_description::{self, OwnedFormatItem};
use time::Date;
use unicode_normalization::UnicodeNormalization;

/// Accepted event-date layouts, tried in order.
const DATE_PATTERNS: [&str; 8] = [
    "[month repr:long case_sensitive:false] [day padding:none], [year]",
    "[month repr:short case_sensitive:false] [day padding:none], [year]",
    "[year]-[month padding:none]-[day padding:none]",
    "[month padding:none]/[day padding:none]/[year]",
    "[day padding:none] [month repr:long case_sensitive:false] [year]",
    "[day padding:none] [month repr:short case_sensitive:false] [year]",
    "[month repr:short case_sensitive:false]-[day padding:none]-[year]",
    "[month repr:long case_sensitive:false]-[day padding:none]-[year]",
];

const ZERO_WIDTH_CHARS: [char; 4] = ['\u{feff}', '\u{200b}', '\u{200c}', '\u{200d}'];

const BLANK_TOKENS: [&str; 8] = ["", "unknown", "n/a", "na", "null", "none", "-", "\u{2014}"];

const MERGE_KEY_DELIMITER: char = '|';

fn compile_patterns<I>(patterns: I) -> Vec<OwnedFormatItem>
where
    I: IntoIterator<Item = String>,
{
    patterns
        .into_iter()
        .filter_map(|pattern| format_description::parse_owned::<2>(&pattern).ok())
        .collect()
}

fn date_formats() -> &'static [OwnedFormatItem] {
    static FORMATS: OnceLock<Vec<OwnedFormatItem>> = OnceLock::new();
    FORMATS.get_or_init(|| compile_patterns(DATE_PATTERNS.iter().map(|p| (*p).to_string())))
}

fn comma_free_date_formats() -> &'static [OwnedFormatItem] {
    static FORMATS: OnceLock<Vec<OwnedFormatItem>> = OnceLock::new();
    FORMATS.get_or_init(|| compile_patterns(DATE_PATTERNS.iter().map(|p| p.replace(',', ""))))
}

#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical competitor identity.
///
/// NFKC-normalized, then Unicode full case folded (`ß` and `ss` compare equal),
/// then trimmed with internal whitespace runs collapsed to one space.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let composed = name.nfkc().collect::<String>();
    collapse_whitespace(&caseless::default_case_fold_str(&composed))
}

/// Canonical column name for a persisted header cell.
///
/// Byte-order marks and zero-width characters are dropped, the rest is trimmed,
/// lowercased, and internal whitespace runs become a single underscore.
#[must_use]
pub fn normalize_header(header: &str) -> String {
    let cleaned = header.chars().filter(|ch| !ZERO_WIDTH_CHARS.contains(ch)).collect::<String>();
    cleaned.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

/// Parse a free-text event date. `None` means the date is absent, not invalid.
#[must_use]
pub fn parse_event_date(raw: &str) -> Option<Date> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return None;
    }

    if let Some(date) = date_formats().iter().find_map(|format| Date::parse(&collapsed, format).ok())
    {
        return Some(date);
    }

    let without_commas = collapsed.replace(',', "");
    comma_free_date_formats().iter().find_map(|format| Date::parse(&without_commas, format).ok())
}

#[must_use]
pub fn iso_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// ISO form of a free-text date, or an empty string when it cannot be parsed.
#[must_use]
pub fn normalize_event_date(raw: &str) -> String {
    parse_event_date(raw).map(iso_date).unwrap_or_default()
}

/// Placeholder check used by inference: blank, `unknown`, `n/a`, dashes and friends.
#[must_use]
pub fn is_blank(value: Option<&str>) -> bool {
    let Some(value) = value else {
        return true;
    };
    let lowered = value.trim().to_lowercase();
    BLANK_TOKENS.contains(&lowered.as_str())
}

/// Narrower check used by merge: only empty values and the `unknown` sentinel.
#[must_use]
pub fn is_unknown(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown")
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MergeKey(String);

impl MergeKey {
    #[must_use]
    pub fn new(event_date: &str, fighter_a: &str, fighter_b: &str) -> Self {
        let iso = normalize_event_date(event_date);
        let a = normalize_name(fighter_a);
        let b = normalize_name(fighter_b);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{iso}{MERGE_KEY_DELIMITER}{lo}{MERGE_KEY_DELIMITER}{hi}"))
    }

    /// True when the date component failed to parse and the key is date-less.
    #[must_use]
    pub fn is_undated(&self) -> bool {
        self.0.starts_with(MERGE_KEY_DELIMITER)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MergeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::Month;

    use super::*;

    fn date(year: i32, month: Month, day: u8) -> Date {
        match Date::from_calendar_date(year, month, day) {
            Ok(date) => date,
            Err(err) => panic!("invalid fixture date: {err}"),
        }
    }

    #[test]
    fn every_date_pattern_compiles() {
        assert_eq!(date_formats().len(), DATE_PATTERNS.len());
        assert_eq!(comma_free_date_formats().len(), DATE_PATTERNS.len());
    }

    #[test]
    fn accepted_date_layouts_agree_on_one_day() {
        let expected = date(2025, Month::August, 23);
        for raw in [
            "August 23, 2025",
            "Aug 23, 2025",
            "2025-08-23",
            "08/23/2025",
            "23 August 2025",
            "23 Aug 2025",
            "Aug-23-2025",
            "August-23-2025",
            "  august   23,  2025 ",
            "AUG 23, 2025",
        ] {
            assert_eq!(parse_event_date(raw), Some(expected), "layout `{raw}`");
        }
    }

    #[test]
    fn single_digit_days_and_months_parse() {
        assert_eq!(parse_event_date("March 5, 2011"), Some(date(2011, Month::March, 5)));
        assert_eq!(parse_event_date("3/5/2011"), Some(date(2011, Month::March, 5)));
    }

    #[test]
    fn missing_or_extra_comma_is_tolerated() {
        let expected = date(2025, Month::August, 23);
        assert_eq!(parse_event_date("August 23 2025"), Some(expected));
        assert_eq!(parse_event_date("23 August, 2025"), Some(expected));
    }

    #[test]
    fn unparseable_dates_normalize_to_empty() {
        assert_eq!(parse_event_date(""), None);
        assert_eq!(parse_event_date("Unknown"), None);
        assert_eq!(parse_event_date("2025-02-30"), None);
        assert_eq!(normalize_event_date("sometime in 2020"), "");
    }

    #[test]
    fn iso_date_is_zero_padded() {
        assert_eq!(iso_date(date(2009, Month::January, 3)), "2009-01-03");
    }

    #[test]
    fn header_with_bom_and_padding_normalizes() {
        assert_eq!(normalize_header(" Event Date \u{feff}"), "event_date");
        assert_eq!(normalize_header("\u{feff}Fighter 1"), "fighter_1");
        assert_eq!(normalize_header("Method\u{200b}  Main"), "method_main");
    }

    #[test]
    fn names_collapse_whitespace_and_case() {
        assert_eq!(normalize_name("  Jon   BONES  Jones "), "jon bones jones");
        assert_eq!(normalize_name("Jon\tJones"), normalize_name("jon jones"));
    }

    #[test]
    fn names_fold_case_beyond_lowercasing() {
        assert_eq!(normalize_name("Weiß"), normalize_name("WEISS"));
        assert_eq!(normalize_name("Weiß"), "weiss");
        assert_eq!(normalize_name("ΟΔΥΣΣΕΥΣ"), normalize_name("οδυσσευς"));
        assert_eq!(normalize_name("Jose\u{301} Aldo"), normalize_name("JOSÉ ALDO"));
        assert_eq!(normalize_name("Jon\u{a0}Jones"), "jon jones");
        assert_eq!(
            MergeKey::new("2020-01-01", "Dan Weiß", "B"),
            MergeKey::new("2020-01-01", "b", "DAN WEISS")
        );
    }

    #[test]
    fn blank_tokens_cover_placeholders() {
        for value in ["", "  ", "Unknown", "N/A", "na", "NULL", "none", "-", "\u{2014}"] {
            assert!(is_blank(Some(value)), "`{value}` should be blank");
        }
        assert!(is_blank(None));
        assert!(!is_blank(Some("Team Alpha")));
    }

    #[test]
    fn merge_unknown_is_narrower_than_blank() {
        assert!(is_unknown(" unknown "));
        assert!(is_unknown(""));
        assert!(!is_unknown("n/a"));
        assert!(is_blank(Some("n/a")));
    }

    #[test]
    fn written_and_iso_dates_share_a_merge_key() {
        let written = MergeKey::new("August 23, 2025", "Alex Pereira", "Israel Adesanya");
        let iso = MergeKey::new("2025-08-23", "israel  adesanya", "ALEX PEREIRA");
        assert_eq!(written, iso);
        assert_eq!(written.as_str(), "2025-08-23|alex pereira|israel adesanya");
    }

    #[test]
    fn unparseable_date_produces_undated_key() {
        let key = MergeKey::new("TBD", "A", "B");
        assert!(key.is_undated());
        assert_eq!(key.as_str(), "|a|b");
        assert!(!MergeKey::new("2020-01-01", "A", "B").is_undated());
    }

    proptest! {
        #[test]
        fn merge_key_ignores_side_order(
            day in 1_u8..=28,
            month in 1_u8..=12,
            year in 1993_i32..2030,
            a in "[A-Za-z ]{0,16}",
            b in "[A-Za-z ]{0,16}",
        ) {
            let raw_date = format!("{year}-{month:02}-{day:02}");
            prop_assert_eq!(MergeKey::new(&raw_date, &a, &b), MergeKey::new(&raw_date, &b, &a));
        }

        #[test]
        fn name_normalization_is_idempotent(name in "[A-Za-z\\-' \t]{0,24}") {
            let once = normalize_name(&name);
            prop_assert_eq!(normalize_name(&once), once.clone());
        }
    }
}
