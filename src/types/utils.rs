//! Shared utility functions for finding normalization and common operations.
//!
//! ## Normalization Helpers
//!
//! Model output arrives as free text. These helpers pin it to closed ranges:
//! - `clamp_confidence`, `clamp_cvss` - Numeric clamping with NaN fallback
//! - `finding_id` - `<prefix>_<count>_<timestamp>` identifiers
//! - `decode_hex_or_raw` - Payload bytes from model-supplied hex

// =============================================================================
// Type Parsing
// =============================================================================

/// Trait for parsing strings into enum types with a default fallback.
/// Used at the model boundary where invalid strings should fall back gracefully.
/// Logs a warning when an invalid value is encountered.
pub trait ParseWithDefault: Sized {
    /// The name of this type for logging purposes.
    fn type_name() -> &'static str;

    /// The default value to use when parsing fails.
    fn default_value() -> Self;

    /// Try to parse an already lower-cased, trimmed string, returning None if invalid.
    fn try_parse(s: &str) -> Option<Self>;

    /// Parse a string into this type, returning a default value if parsing fails.
    fn parse_or_default(s: &str) -> Self {
        let normalized = s.trim().to_lowercase();
        match Self::try_parse(&normalized) {
            Some(v) => v,
            None => {
                tracing::warn!("Invalid {} value '{}', using default", Self::type_name(), s);
                Self::default_value()
            }
        }
    }
}

// =============================================================================
// Numeric Normalization
// =============================================================================

/// Clamp into `[min, max]`; NaN becomes `fallback`.
#[inline]
pub fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Confidence scores live in [0, 1].
#[inline]
pub fn clamp_confidence(value: f64, fallback: f64) -> f64 {
    clamp_or(value, 0.0, 1.0, fallback)
}

/// CVSS estimates live in [0, 10].
#[inline]
pub fn clamp_cvss(value: f64) -> f64 {
    clamp_or(value, 0.0, 10.0, 5.0)
}

// =============================================================================
// Identifiers & Time
// =============================================================================

/// Seconds since the Unix epoch.
#[inline]
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Seconds since the Unix epoch with sub-second precision.
#[inline]
pub fn unix_timestamp_f64() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// `<prefix>_<count>_<timestamp>`
pub fn finding_id(prefix: &str, count: usize) -> String {
    format!("{}_{}_{}", prefix, count, unix_timestamp())
}

// =============================================================================
// Text & Bytes
// =============================================================================

/// First `max_chars` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Decode hex (whitespace and an optional `0x` prefix tolerated); anything
/// that is not valid hex is taken as its raw UTF-8 bytes.
pub fn decode_hex_or_raw(input: &str) -> Vec<u8> {
    let compact: String = input.split_whitespace().collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    match hex::decode(digits) {
        Ok(bytes) => bytes,
        Err(_) => input.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, PartialEq)]
    enum Color {
        Red,
        Blue,
    }

    impl ParseWithDefault for Color {
        fn type_name() -> &'static str {
            "Color"
        }

        fn default_value() -> Self {
            Color::Red
        }

        fn try_parse(s: &str) -> Option<Self> {
            match s {
                "red" => Some(Color::Red),
                "blue" => Some(Color::Blue),
                _ => None,
            }
        }
    }

    #[test]
    fn test_parse_or_default_normalizes_case() {
        assert_eq!(Color::parse_or_default("  BLUE "), Color::Blue);
        assert_eq!(Color::parse_or_default("green"), Color::Red);
        assert_eq!(Color::parse_or_default(""), Color::Red);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(clamp_confidence(5.0, 0.5), 1.0);
        assert_eq!(clamp_confidence(-0.2, 0.5), 0.0);
        assert_eq!(clamp_confidence(f64::NAN, 0.5), 0.5);
        assert_eq!(clamp_cvss(-3.0), 0.0);
        assert_eq!(clamp_cvss(42.0), 10.0);
        assert_eq!(clamp_cvss(7.5), 7.5);
    }

    #[test]
    fn test_finding_id_shape() {
        let id = finding_id("flip", 3);
        let parts: Vec<_> = id.splitn(3, '_').collect();
        assert_eq!(parts[0], "flip");
        assert_eq!(parts[1], "3");
        assert!(parts[2].parse::<i64>().is_ok());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_decode_hex_or_raw() {
        assert_eq!(decode_hex_or_raw("41424344"), b"ABCD".to_vec());
        assert_eq!(decode_hex_or_raw("0x41 42"), b"AB".to_vec());
        assert_eq!(decode_hex_or_raw("not hex"), b"not hex".to_vec());
        assert_eq!(decode_hex_or_raw("abc"), b"abc".to_vec());
        assert!(decode_hex_or_raw("").is_empty());
    }

    proptest! {
        #[test]
        fn prop_confidence_always_in_unit_range(v in proptest::num::f64::ANY) {
            let c = clamp_confidence(v, 0.5);
            prop_assert!((0.0..=1.0).contains(&c));
        }

        #[test]
        fn prop_cvss_always_in_range(v in proptest::num::f64::ANY) {
            let c = clamp_cvss(v);
            prop_assert!((0.0..=10.0).contains(&c));
        }
    }
}
