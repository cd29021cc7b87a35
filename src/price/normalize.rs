//! Strips whitespace variants, currency markers and ranges from raw price text.
//!
//! The result is not numeric yet: it may still carry mixed `,`/`.` separators
//! and stray letters. [`super::numeric::canonicalize`] resolves those.

/// Characters removed outright besides Unicode whitespace (which already
/// covers the no-break `U+00A0`, narrow no-break `U+202F` and thin/six-per-em
/// `U+2009`/`U+2006` spaces).
const INVISIBLE: &[char] = &['\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}'];

/// Currency symbols, abbreviations and encoding debris, longest first so that
/// `руб.` is removed before `р.` could match a fragment of it.
const CURRENCY_MARKERS: &[&str] = &[
    "руб.", "руб", "р.", "RUB", "EUR", "USD", "₽", "€", "$", "£", "¥", "₹",
    // mis-decoded UTF-8 (e.g. "Â " in front of a no-break space) and U+FFFD
    "Â", "\u{fffd}",
];

/// Dash-like characters that separate the bounds of a range.
const RANGE_DASHES: &[char] = &['\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2212}'];

/// Normalizes a raw text fragment read from a page.
///
/// Applies, in order:
/// 1. removal of every whitespace variant and zero-width characters;
/// 2. removal of currency symbols and abbreviations;
/// 3. range resolution: if a hyphen remains, the text is split on it and the
///    first piece containing a digit is kept (the lower bound).
pub fn normalize(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !INVISIBLE.contains(c))
        .map(|c| if RANGE_DASHES.contains(&c) { '-' } else { c })
        .collect();

    for marker in CURRENCY_MARKERS {
        if cleaned.contains(marker) {
            cleaned = cleaned.replace(marker, "");
        }
    }

    if cleaned.contains('-') {
        if let Some(first) =
            cleaned.split('-').find(|part| part.chars().any(|c| c.is_ascii_digit()))
        {
            return first.to_string();
        }
    }

    cleaned
}
