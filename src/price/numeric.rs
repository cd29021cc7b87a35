//! Thousands/decimal separator disambiguation without locale information.
//!
//! The rightmost `,` or `.` is taken as the decimal point because grouping
//! separators always precede the final group. One exception: a lone separator
//! followed by exactly three digits is a thousands separator, so `"1.234"` is
//! 1234 while `"1.23"` is 1.23. The rule is a deterministic heuristic;
//! `"12.345"` is inherently ambiguous and always reads as 12345.

use regex_lite::Regex;
use std::fmt;
use std::sync::LazyLock;

static NUMBER_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+-]?[\d,.]+").unwrap());

static CANONICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+|\d*\.\d+)$").unwrap());

const SEPARATORS: [char; 2] = [',', '.'];

/// A locale-resolved decimal string matching `^[+-]?(\d+|\d*\.\d+)$`.
///
/// Never holds more than one decimal point and never holds a grouping
/// character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalNumber(String);

impl CanonicalNumber {
    /// Returns the canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the canonical string, rejecting overflow to infinity.
    pub fn to_f64(&self) -> Option<f64> {
        self.0.parse::<f64>().ok().filter(|value| value.is_finite())
    }
}

impl fmt::Display for CanonicalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the first number from normalized text and resolves its separators.
///
/// Returns `None` when the text holds no digit/separator run or the run
/// cannot be assembled into a canonical number.
pub fn canonicalize(normalized: &str) -> Option<CanonicalNumber> {
    let run = NUMBER_RUN.find(normalized)?.as_str();

    let separator_count = run.chars().filter(|c| SEPARATORS.contains(c)).count();
    if separator_count == 0 {
        return validated(run.to_string());
    }

    let (sign, body) = match run.strip_prefix(['+', '-']) {
        Some(rest) => (&run[..1], rest),
        None => ("", run),
    };

    // rfind over ASCII separators yields a char boundary
    let split_at = body.rfind(SEPARATORS)?;
    let integer: String = body[..split_at].chars().filter(|c| !SEPARATORS.contains(c)).collect();
    let fraction: String = body[split_at + 1..].chars().filter(char::is_ascii_digit).collect();

    let assembled = if separator_count == 1 && fraction.len() == 3 {
        format!("{sign}{integer}{fraction}")
    } else if !fraction.is_empty() {
        let integer = if integer.is_empty() { "0" } else { integer.as_str() };
        format!("{sign}{integer}.{fraction}")
    } else if !integer.is_empty() {
        format!("{sign}{integer}")
    } else {
        return None;
    };

    validated(assembled)
}

fn validated(candidate: String) -> Option<CanonicalNumber> {
    CANONICAL.is_match(&candidate).then_some(CanonicalNumber(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(text: &str) -> Option<f64> {
        canonicalize(text)?.to_f64()
    }

    fn canonical(text: &str) -> Option<String> {
        canonicalize(text).map(|c| c.as_str().to_string())
    }

    #[test]
    fn test_locale_disambiguation() {
        assert_eq!(value("1.234"), Some(1234.0));
        assert_eq!(value("1,234.56"), Some(1234.56));
        assert_eq!(value("1234,56"), Some(1234.56));
        assert_eq!(value(".95"), Some(0.95));
        assert_eq!(value("1.234,56"), Some(1234.56));
        assert_eq!(value("1.23"), Some(1.23));
        assert_eq!(value("1,5"), Some(1.5));
    }

    #[test]
    fn test_single_separator_with_three_digits_is_grouping() {
        assert_eq!(canonical("1.234"), Some("1234".to_string()));
        assert_eq!(canonical("1,234"), Some("1234".to_string()));
        assert_eq!(canonical("12.345"), Some("12345".to_string()));
        // Two separators: the rightmost is decimal even before three digits
        assert_eq!(canonical("1,234.567"), Some("1234.567".to_string()));
        assert_eq!(canonical("1.234.567"), Some("1234.567".to_string()));
    }

    #[test]
    fn test_canonical_forms() {
        assert_eq!(canonical("1999"), Some("1999".to_string()));
        assert_eq!(canonical("1999,00"), Some("1999.00".to_string()));
        assert_eq!(canonical(",5"), Some("0.5".to_string()));
        assert_eq!(canonical("100."), Some("100".to_string()));
        assert_eq!(canonical("-1,5"), Some("-1.5".to_string()));
        assert_eq!(canonical("+.75"), Some("+0.75".to_string()));
    }

    #[test]
    fn test_first_run_wins() {
        assert_eq!(canonical("от1999до2999"), Some("1999".to_string()));
        assert_eq!(canonical("Цена:2490"), Some("2490".to_string()));
        assert_eq!(canonical("x12.50y7"), Some("12.50".to_string()));
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(canonicalize("N/A"), None);
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("abc"), None);
        // A bare separator run has neither integer nor fraction digits
        assert_eq!(canonicalize(",."), None);
        assert_eq!(canonicalize("."), None);
    }

    #[test]
    fn test_idempotent_on_canonical_strings() {
        for text in ["1234.56", "1999", "0.95", "42.5", "-3.25", "0"] {
            let once = canonicalize(text).unwrap();
            let twice = canonicalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {text}");
            assert_eq!(once.to_f64(), twice.to_f64());
        }
    }

    #[test]
    fn test_overflow_is_rejected() {
        let huge = "9".repeat(400);
        let number = canonicalize(&huge).unwrap();
        assert_eq!(number.to_f64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(canonicalize("1 234").unwrap().to_string(), "1");
        assert_eq!(canonicalize("1.234,5").unwrap().to_string(), "1234.5");
    }
}
