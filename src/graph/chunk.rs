//! Chunk representation.
//!
//! Chunks are produced by the advanced-chunking phase and frozen by
//! canonical packing. Each chunk keeps its byte span in the content
//! stream, a BLAKE3 hash of that span, policy/temporal/geographic facets,
//! structured KPI and budget evidence, and the ids of its provenance-bound
//! tokens.

use crate::schema::SchemaSpec;
use serde::{Deserialize, Serialize};

/// Chunk resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    /// Whole section (one per Eje, or the document root).
    Macro,
    /// 800-1200 token window.
    Meso,
    /// 200-400 token window.
    Micro,
}

impl Resolution {
    /// The immediately finer resolution, if any.
    #[must_use]
    pub const fn finer(self) -> Option<Self> {
        match self {
            Self::Macro => Some(Self::Meso),
            Self::Meso => Some(Self::Micro),
            Self::Micro => None,
        }
    }
}

/// A byte span in the logical content stream.
///
/// Spans are monotonic and non-overlapping within a resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextSpan {
    /// Inclusive start offset.
    pub byte_start: u64,
    /// Exclusive end offset.
    pub byte_end: u64,
}

impl TextSpan {
    /// Creates a span.
    #[must_use]
    pub const fn new(byte_start: u64, byte_end: u64) -> Self {
        Self {
            byte_start,
            byte_end,
        }
    }

    /// Span length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.byte_end.saturating_sub(self.byte_start)
    }

    /// Returns `true` for zero-length spans.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.byte_end <= self.byte_start
    }

    /// Returns `true` if the spans share at least one byte.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.byte_start < other.byte_end && other.byte_start < self.byte_end
    }

    /// Number of bytes shared with another span.
    #[must_use]
    pub const fn overlap_len(&self, other: &Self) -> u64 {
        let start = if self.byte_start > other.byte_start {
            self.byte_start
        } else {
            other.byte_start
        };
        let end = if self.byte_end < other.byte_end {
            self.byte_end
        } else {
            other.byte_end
        };
        end.saturating_sub(start)
    }
}

/// Policy facets: where the chunk sits in the plan's structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyFacets {
    /// Eje (strategic axis) label, if detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eje: Option<String>,
    /// Programa label, if detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub programa: Option<String>,
    /// Proyecto label, if detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proyecto: Option<String>,
    /// ODS (sustainable development goal) tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ods: Vec<String>,
}

/// Temporal facets: the period the chunk's content applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalFacets {
    /// First year mentioned or implied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_year: Option<i32>,
    /// Last year mentioned or implied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_year: Option<i32>,
    /// Vigencia period label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vigencia: Option<String>,
}

/// Geographic facets: the territory the chunk's content applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoFacets {
    /// Territorial level (municipio, departamento, nacional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// DANE or equivalent territorial code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Territory names mentioned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

/// A structured KPI row attached to a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    /// Indicator name.
    pub indicator: String,
    /// Baseline value text.
    pub baseline: String,
    /// Target value text.
    pub target: String,
    /// Measurement unit.
    pub unit: String,
}

/// A structured budget row attached to a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRecord {
    /// Row label.
    pub label: String,
    /// Total amount.
    pub amount: f64,
    /// Component amounts, when the row itemizes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<f64>,
    /// Relative imbalance between the total and its components.
    pub imbalance: f64,
}

/// Per-layer confidence scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerConfidence {
    /// Layout analysis confidence.
    pub layout: f64,
    /// OCR confidence (1.0 when no OCR ran).
    pub ocr: f64,
    /// Structural typing confidence.
    pub typing: f64,
}

impl Default for LayerConfidence {
    fn default() -> Self {
        Self {
            layout: 1.0,
            ocr: 1.0,
            typing: 1.0,
        }
    }
}

/// A chunk of the multi-resolution graph.
///
/// Immutable once Phase 9 packs the graph; downstream consumers receive
/// owned copies and never write back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk id. Matrix cells use `PA{nn}-DIM{nn}`; structural
    /// chunks use `{resolution}-{ordinal}` ids.
    pub id: String,

    /// NFC-normalized text of the span.
    pub text: String,

    /// Resolution tag.
    pub resolution: Resolution,

    /// Byte span in the content stream.
    pub span: TextSpan,

    /// BLAKE3 hash of the span bytes (hex).
    pub content_hash: String,

    /// Policy area id (`PA01`..`PA10`) for matrix cell chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_area_id: Option<String>,

    /// Dimension id (`DIM01`..`DIM06`) for matrix cell chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_id: Option<String>,

    /// Policy facets.
    #[serde(default)]
    pub policy: PolicyFacets,

    /// Temporal facets.
    #[serde(default)]
    pub temporal: TemporalFacets,

    /// Geographic facets.
    #[serde(default)]
    pub geo: GeoFacets,

    /// Structured KPI evidence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kpis: Vec<KpiRecord>,

    /// Structured budget evidence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub budgets: Vec<BudgetRecord>,

    /// Named entities detected in the span.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,

    /// Ids of the provenance-bound tokens inside the span.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_ids: Vec<String>,

    /// Per-layer confidences.
    #[serde(default)]
    pub confidence: LayerConfidence,

    /// Elements this chunk provides, for schema compatibility checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_elements: Option<SchemaSpec>,
}

impl Chunk {
    /// Creates a structural chunk over a span of the content stream.
    ///
    /// The content hash is computed from the text bytes immediately so the
    /// hash and the text can never drift apart.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, resolution: Resolution, span: TextSpan) -> Self {
        let text = text.into();
        let content_hash = blake3::hash(text.as_bytes()).to_hex().to_string();
        Self {
            id: id.into(),
            text,
            resolution,
            span,
            content_hash,
            policy_area_id: None,
            dimension_id: None,
            policy: PolicyFacets::default(),
            temporal: TemporalFacets::default(),
            geo: GeoFacets::default(),
            kpis: Vec::new(),
            budgets: Vec::new(),
            entities: Vec::new(),
            token_ids: Vec::new(),
            confidence: LayerConfidence::default(),
            expected_elements: None,
        }
    }

    /// Estimated token count (~4 characters per token).
    #[must_use]
    pub fn estimate_tokens(&self) -> usize {
        self.text.len().div_ceil(4)
    }

    /// Returns `true` when the chunk has no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
