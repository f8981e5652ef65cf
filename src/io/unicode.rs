//! Unicode utilities for text processing.
//!
//! Provides helpers for character boundary detection, validation, and the
//! NFC normalization applied by the text-extraction phase. All byte offsets
//! recorded in the content stream refer to NFC-normalized text, so the
//! normalizer runs before any offset is assigned.

use unicode_normalization::{IsNormalized, UnicodeNormalization, is_nfc_quick};
use unicode_segmentation::UnicodeSegmentation;

/// Finds a valid UTF-8 character boundary at or before the given position.
///
/// # Arguments
///
/// * `s` - The string to search.
/// * `pos` - Target position in bytes.
///
/// # Returns
///
/// A byte position that is a valid UTF-8 character boundary.
///
/// # Examples
///
/// ```
/// use cpp_rs::io::find_char_boundary;
///
/// let s = "meta 10% año";
/// assert_eq!(find_char_boundary(s, 4), 4);
/// ```
#[must_use]
pub const fn find_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let bytes = s.as_bytes();
    let mut boundary = pos;
    // UTF-8 continuation bytes start with 10xxxxxx (0x80-0xBF)
    while boundary > 0 && (bytes[boundary] & 0xC0) == 0x80 {
        boundary -= 1;
    }
    boundary
}

/// Validates that a byte slice is valid UTF-8.
///
/// # Errors
///
/// Returns the byte offset of the first invalid UTF-8 sequence.
pub fn validate_utf8(bytes: &[u8]) -> std::result::Result<&str, usize> {
    std::str::from_utf8(bytes).map_err(|e| e.valid_up_to())
}

/// Applies Unicode NFC normalization.
///
/// Returns the input unchanged (no allocation) when it is already NFC,
/// which is the common case for machine-produced documents.
///
/// # Examples
///
/// ```
/// use cpp_rs::io::nfc_normalize;
///
/// // U+0061 U+0301 (decomposed) becomes U+00E1 (composed)
/// assert_eq!(nfc_normalize("a\u{0301}"), "\u{00e1}");
/// assert_eq!(nfc_normalize("plan"), "plan");
/// ```
#[must_use]
pub fn nfc_normalize(s: &str) -> String {
    if is_nfc(s) {
        s.to_string()
    } else {
        s.nfc().collect()
    }
}

/// Returns `true` if the string is already in NFC form.
#[must_use]
pub fn is_nfc(s: &str) -> bool {
    match is_nfc_quick(s.chars()) {
        IsNormalized::Yes => true,
        IsNormalized::No => false,
        IsNormalized::Maybe => s.nfc().eq(s.chars()),
    }
}

/// Splits text into sentence spans using Unicode segmentation rules.
///
/// Returns `(byte_start, byte_end)` pairs covering the whole input in
/// order. Used by boundary detection in the chunking phase and by the
/// executor's sentence argument resolution.
#[must_use]
pub fn sentence_spans(s: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut pos = 0;
    for sentence in s.split_sentence_bounds() {
        let end = pos + sentence.len();
        spans.push((pos, end));
        pos = end;
    }
    spans
}

/// Splits text into whitespace-delimited tokens with byte ranges.
///
/// Token ranges are relative to the input and never overlap. These become
/// the provenance-bound tokens of Phase 7.
#[must_use]
pub fn token_spans(s: &str) -> Vec<(usize, usize)> {
    s.split_word_bound_indices()
        .filter(|(_, w)| !w.trim().is_empty())
        .map(|(start, w)| (start, start + w.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_char_boundary_ascii() {
        let s = "hello";
        assert_eq!(find_char_boundary(s, 0), 0);
        assert_eq!(find_char_boundary(s, 3), 3);
        assert_eq!(find_char_boundary(s, 10), 5);
    }

    #[test]
    fn test_find_char_boundary_multibyte() {
        let s = "año"; // 'ñ' is two bytes (1..3)
        assert_eq!(find_char_boundary(s, 2), 1);
        assert_eq!(find_char_boundary(s, 3), 3);
    }

    #[test]
    fn test_validate_utf8() {
        assert!(validate_utf8(b"presupuesto").is_ok());
        assert_eq!(validate_utf8(&[b'a', 0xff, 0xfe]), Err(1));
    }

    #[test]
    fn test_nfc_normalize_composes() {
        let decomposed = "desnutricio\u{0301}n";
        let normalized = nfc_normalize(decomposed);
        assert_eq!(normalized, "desnutrici\u{00f3}n");
        assert!(is_nfc(&normalized));
    }

    #[test]
    fn test_nfc_normalize_identity() {
        let s = "reducir desnutrición 10%";
        assert_eq!(nfc_normalize(s), s);
    }

    #[test]
    fn test_is_nfc() {
        assert!(is_nfc("plan de desarrollo"));
        assert!(!is_nfc("a\u{0301}"));
    }

    #[test]
    fn test_sentence_spans_cover_input() {
        let s = "Primera meta. Segunda meta? Tercera.";
        let spans = sentence_spans(s);
        assert!(!spans.is_empty());
        assert_eq!(spans[0].0, 0);
        assert_eq!(spans.last().map(|s| s.1), Some(s.len()));
        // Spans are contiguous
        for pair in spans.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn test_token_spans_no_whitespace() {
        let s = "presupuesto municipal 2024";
        let tokens = token_spans(s);
        assert_eq!(tokens.len(), 3);
        for (start, end) in tokens {
            assert!(!s[start..end].trim().is_empty());
        }
    }

    #[test]
    fn test_token_spans_empty() {
        assert!(token_spans("").is_empty());
        assert!(token_spans("   ").is_empty());
    }
}
