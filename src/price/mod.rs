//! Price text normalization and locale-agnostic numeric parsing.

pub mod normalize;
pub mod numeric;

pub use normalize::normalize;
pub use numeric::{canonicalize, CanonicalNumber};

/// Runs the full pipeline on a raw fragment: normalize, canonicalize, parse.
///
/// Returns `None` when no price can be extracted. A legitimate zero price is
/// `Some(0.0)`.
pub fn parse_price(raw: &str) -> Option<f64> {
    let normalized = normalize(raw);
    canonicalize(&normalized)?.to_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_pipeline() {
        assert_eq!(parse_price(" 1 999,00 ₽"), Some(1999.0));
        assert_eq!(parse_price("1 234,50 ₽"), Some(1234.5));
        assert_eq!(parse_price("$1,234.56"), Some(1234.56));
        assert_eq!(parse_price("100-150"), Some(100.0));
        assert_eq!(parse_price("от 2 490 руб."), Some(2490.0));
        assert_eq!(parse_price("0,00 €"), Some(0.0));
    }

    #[test]
    fn test_parse_price_unavailable() {
        assert_eq!(parse_price("N/A"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("   "), None);
        assert_eq!(parse_price("нет в наличии"), None);
    }

    #[test]
    fn test_parse_price_real_storefront_fragments() {
        // Typical marketplace fragments with narrow no-break spaces
        assert_eq!(parse_price("24\u{202f}990\u{a0}₽"), Some(24990.0));
        assert_eq!(parse_price("29 990 ₽"), Some(29990.0));
        assert_eq!(parse_price("€ 1.299,99"), Some(1299.99));
        assert_eq!(parse_price("£49.99"), Some(49.99));
        assert_eq!(parse_price("¥2,999"), Some(2999.0));
        assert_eq!(parse_price("₹ 12,499"), Some(12499.0));
    }
}
