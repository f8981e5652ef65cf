//! Parser adapters for format decomposition (Phase 2).
//!
//! Format parsers proper (PDF, DOCX) are external collaborators; this
//! module defines the seam they plug into and ships a plain-text adapter
//! that doubles as the test fixture. Adapters receive the acquired bytes
//! plus the source manifest and return a raw object tree of pages.

use crate::content::SourceManifest;
use crate::content::stream::BoundingBox;
use crate::error::{IngestError, Result};
use std::collections::BTreeMap;

/// A layout box emitted by a parser.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    /// Geometry of the box in page coordinates.
    pub bbox: BoundingBox,
    /// Byte range within the page text this box covers.
    pub byte_range: (usize, usize),
}

/// A candidate tabular region emitted by a parser.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCandidate {
    /// Raw rows, each a list of cell texts in reading order.
    pub rows: Vec<Vec<String>>,
    /// Byte range within the page text the table covers.
    pub byte_range: (usize, usize),
}

/// One page of the raw object tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    /// Numeric page id (0-based).
    pub page_id: i32,
    /// Extracted text in reading order (pre-normalization).
    pub text: String,
    /// Layout boxes, possibly empty.
    pub layout_boxes: Vec<LayoutBox>,
    /// Table candidates, possibly empty.
    pub table_candidates: Vec<TableCandidate>,
    /// Byte range of this page in the raw source.
    pub source_byte_range: (usize, usize),
    /// Parser-reported layout confidence in [0, 1].
    pub layout_confidence: f64,
}

/// The raw object tree produced by format decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// Identifier of the adapter that produced the tree.
    pub parser_id: String,
    /// Pages in document order.
    pub pages: Vec<RawPage>,
}

/// Trait for external format parsers.
///
/// Implementations must be `Send + Sync`; the orchestrator may run one
/// document per worker and adapters are shared read-only.
pub trait ParserAdapter: Send + Sync {
    /// Decomposes acquired bytes into the raw page tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not parseable as this format.
    fn decompose(&self, bytes: &[u8], manifest: &SourceManifest) -> Result<RawDocument>;

    /// Stable identifier recorded in token provenance.
    fn parser_id(&self) -> &'static str;

    /// MIME types this adapter accepts.
    fn accepts(&self) -> &'static [&'static str];
}

/// Registry of parser adapters keyed by MIME type.
///
/// The built-in plain-text adapter is always registered; PDF/DOCX
/// adapters are added by the embedding application.
pub struct AdapterRegistry {
    by_mime: BTreeMap<&'static str, Box<dyn ParserAdapter>>,
    aliases: BTreeMap<&'static str, &'static str>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// Creates a registry with the built-in plain-text adapter.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            by_mime: BTreeMap::new(),
            aliases: BTreeMap::new(),
        };
        registry.register(Box::new(PlainTextAdapter::new()));
        registry
    }

    /// Registers an adapter for every MIME type it accepts.
    pub fn register(&mut self, adapter: Box<dyn ParserAdapter>) {
        // A single adapter instance may serve several MIME types; store it
        // under the first and alias the rest.
        let mimes = adapter.accepts();
        if let Some((first, rest)) = mimes.split_first() {
            for mime in rest {
                self.aliases.insert(mime, first);
            }
            self.by_mime.insert(first, adapter);
        }
    }

    /// Resolves the adapter for a MIME type.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnsupportedFormat`] when nothing is registered.
    pub fn resolve(&self, mime: &str) -> Result<&dyn ParserAdapter> {
        let key = self.aliases.get(mime).copied().unwrap_or(mime);
        self.by_mime
            .get(key)
            .map(std::convert::AsRef::as_ref)
            .ok_or_else(|| {
                IngestError::UnsupportedFormat {
                    mime: mime.to_string(),
                }
                .into()
            })
    }
}

/// Built-in adapter for `text/plain` sources.
///
/// Pages are split on form feeds (`\x0c`); a document without form feeds
/// is a single page. Layout confidence is 1.0 (native text), and layout
/// boxes are synthesized as zero-area line markers.
#[derive(Debug, Clone, Default)]
pub struct PlainTextAdapter;

impl PlainTextAdapter {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ParserAdapter for PlainTextAdapter {
    fn decompose(&self, bytes: &[u8], _manifest: &SourceManifest) -> Result<RawDocument> {
        let text = std::str::from_utf8(bytes).map_err(|e| IngestError::PhaseFailed {
            phase: "Phase 2",
            reason: format!("source is not valid UTF-8 at byte {}", e.valid_up_to()),
        })?;

        let mut pages = Vec::new();
        let mut source_offset = 0usize;
        for (page_id, page_text) in text.split('\u{0c}').enumerate() {
            let end = source_offset + page_text.len();
            pages.push(RawPage {
                page_id: i32::try_from(page_id).unwrap_or(i32::MAX),
                text: page_text.to_string(),
                layout_boxes: Vec::new(),
                table_candidates: detect_table_candidates(page_text),
                source_byte_range: (source_offset, end),
                layout_confidence: 1.0,
            });
            source_offset = end + 1; // skip the form feed
        }

        Ok(RawDocument {
            parser_id: self.parser_id().to_string(),
            pages,
        })
    }

    fn parser_id(&self) -> &'static str {
        "plain-text"
    }

    fn accepts(&self) -> &'static [&'static str] {
        &["text/plain"]
    }
}

/// Detects table-like regions in plain text: runs of consecutive lines
/// containing `|` separators or 2+ column gaps.
fn detect_table_candidates(text: &str) -> Vec<TableCandidate> {
    let mut candidates = Vec::new();
    let mut current_rows: Vec<Vec<String>> = Vec::new();
    let mut current_start = 0usize;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n');
        let cells = split_table_line(trimmed);
        if cells.len() >= 2 {
            if current_rows.is_empty() {
                current_start = offset;
            }
            current_rows.push(cells);
        } else if !current_rows.is_empty() {
            candidates.push(TableCandidate {
                rows: std::mem::take(&mut current_rows),
                byte_range: (current_start, offset),
            });
        }
        offset += line.len();
    }
    if !current_rows.is_empty() {
        candidates.push(TableCandidate {
            rows: current_rows,
            byte_range: (current_start, offset),
        });
    }
    candidates
}

/// Splits a line into table cells on `|` or runs of 2+ spaces.
fn split_table_line(line: &str) -> Vec<String> {
    let cells: Vec<String> = if line.contains('|') {
        line.split('|')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        line.split("  ")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    };
    cells
}
