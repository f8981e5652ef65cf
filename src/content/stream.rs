//! Content stream and provenance map types.
//!
//! The content stream is the Phase 4 output: one row per page of
//! NFC-normalized text with byte offsets into a single logical stream.
//! Offsets are strictly monotone in (page_id, byte_offset) and always land
//! on char boundaries of the normalized text.
//!
//! The provenance map is the Phase 7 output: every token bound to
//! (page, bounding box, byte range, parser).

use serde::{Deserialize, Serialize};

/// One page row of the columnar content stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRow {
    /// Numeric page id (0-based, strictly increasing).
    pub page_id: i32,
    /// NFC-normalized page text.
    pub text: String,
    /// Byte offset of this page's text in the logical stream.
    pub byte_start: i64,
    /// One past the last byte of this page's text.
    pub byte_end: i64,
}

/// The columnar content stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentStream {
    /// Page rows in stream order.
    pub rows: Vec<PageRow>,
}

impl ContentStream {
    /// Total length of the logical stream in bytes.
    #[must_use]
    pub fn total_len(&self) -> u64 {
        self.rows.last().map_or(0, |r| r.byte_end as u64)
    }

    /// Returns the concatenated stream text.
    #[must_use]
    pub fn full_text(&self) -> String {
        let mut out = String::with_capacity(usize::try_from(self.total_len()).unwrap_or(0));
        for row in &self.rows {
            out.push_str(&row.text);
        }
        out
    }

    /// Slices the stream text for a byte range of the logical stream.
    ///
    /// Returns `None` when the range is out of bounds or splits a char.
    #[must_use]
    pub fn slice(&self, byte_start: u64, byte_end: u64) -> Option<String> {
        if byte_end < byte_start || byte_end > self.total_len() {
            return None;
        }
        let mut out = String::new();
        for row in &self.rows {
            let row_start = row.byte_start as u64;
            let row_end = row.byte_end as u64;
            if row_end <= byte_start || row_start >= byte_end {
                continue;
            }
            let lo = byte_start.max(row_start) - row_start;
            let hi = byte_end.min(row_end) - row_start;
            let (lo, hi) = (usize::try_from(lo).ok()?, usize::try_from(hi).ok()?);
            if !row.text.is_char_boundary(lo) || !row.text.is_char_boundary(hi) {
                return None;
            }
            out.push_str(&row.text[lo..hi]);
        }
        Some(out)
    }

    /// Checks that rows are strictly monotone in (page_id, byte offset),
    /// contiguous, and that every offset is a char boundary of its row.
    ///
    /// Returns the first violation as a human-readable reason.
    #[must_use]
    pub fn check_monotone(&self) -> Option<String> {
        let mut expected_start: i64 = 0;
        let mut last_page: i32 = -1;
        for row in &self.rows {
            if row.page_id <= last_page {
                return Some(format!(
                    "page_id {} not strictly increasing after {}",
                    row.page_id, last_page
                ));
            }
            if row.byte_start != expected_start {
                return Some(format!(
                    "page {} byte_start {} != expected {}",
                    row.page_id, row.byte_start, expected_start
                ));
            }
            let len = row.text.len() as i64;
            if row.byte_end - row.byte_start != len {
                return Some(format!(
                    "page {} byte range [{}, {}) disagrees with text length {}",
                    row.page_id, row.byte_start, row.byte_end, len
                ));
            }
            last_page = row.page_id;
            expected_start = row.byte_end;
        }
        None
    }
}

/// A layout bounding box in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x0: f64,
    /// Top edge.
    pub y0: f64,
    /// Right edge.
    pub x1: f64,
    /// Bottom edge.
    pub y1: f64,
}

impl BoundingBox {
    /// A zero-area box used when the parser provides no layout geometry.
    pub const EMPTY: Self = Self {
        x0: 0.0,
        y0: 0.0,
        x1: 0.0,
        y1: 0.0,
    };
}

/// One token binding of the provenance map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBinding {
    /// Stable token id, `p{page}-t{ordinal}`.
    pub token_id: String,
    /// Page the token appears on.
    pub page_id: i32,
    /// Layout bounding box (zero-area when the parser has none).
    pub bbox: BoundingBox,
    /// Byte offset of the token in the logical stream.
    pub byte_start: i64,
    /// One past the last byte of the token.
    pub byte_end: i64,
    /// Identifier of the parser that emitted the token.
    pub parser_id: String,
    /// Per-token confidence (1.0 for native text, OCR confidence otherwise).
    pub confidence: f64,
}

/// The token-level provenance map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceMap {
    /// Token bindings in stream order.
    pub tokens: Vec<TokenBinding>,
}

impl ProvenanceMap {
    /// Fraction of tokens that carry a complete binding.
    ///
    /// The Phase 7 postcondition requires this to be exactly 1.0.
    #[must_use]
    pub fn completeness(&self) -> f64 {
        if self.tokens.is_empty() {
            return 1.0;
        }
        let bound = self
            .tokens
            .iter()
            .filter(|t| {
                !t.token_id.is_empty()
                    && !t.parser_id.is_empty()
                    && t.page_id >= 0
                    && t.byte_end > t.byte_start
            })
            .count();
        bound as f64 / self.tokens.len() as f64
    }

    /// Tokens whose byte range intersects the given stream range.
    #[must_use]
    pub fn tokens_in_range(&self, byte_start: i64, byte_end: i64) -> Vec<&TokenBinding> {
        self.tokens
            .iter()
            .filter(|t| t.byte_start < byte_end && byte_start < t.byte_end)
            .collect()
    }
}
