//! Signal packs: per-policy-area pattern bundles.
//!
//! A pack is built exclusively from the question monolith slice for its
//! policy area and carries that slice's BLAKE3 fingerprint. Context
//! predicates are conjunctive over declared fields; an unknown or empty
//! predicate field evaluates as unrestricted.

use crate::ids::PolicyArea;
use crate::schema::SchemaSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pattern match mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Regular-expression pattern.
    Regex,
    /// Plain substring pattern.
    Substring,
}

/// Context predicates restricting where a pattern applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextPredicates {
    /// Sections the pattern is restricted to (empty = unrestricted).
    pub sections: Vec<String>,
    /// Chapters the pattern is restricted to (empty = unrestricted).
    pub chapters: Vec<String>,
    /// Policy areas the pattern is restricted to (empty = unrestricted).
    pub policy_areas: Vec<String>,
}

impl ContextPredicates {
    /// Conjunctive satisfaction against a chunk context.
    #[must_use]
    pub fn satisfied_by(&self, context: &ChunkContext) -> bool {
        let field_ok = |allowed: &[String], actual: Option<&String>| {
            allowed.is_empty() || actual.is_some_and(|a| allowed.iter().any(|x| x == a))
        };
        field_ok(&self.sections, context.section.as_ref())
            && field_ok(&self.chapters, context.chapter.as_ref())
            && field_ok(&self.policy_areas, context.policy_area.as_ref())
    }
}

/// A chunk's filtering context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkContext {
    /// Section label of the chunk.
    pub section: Option<String>,
    /// Chapter label of the chunk.
    pub chapter: Option<String>,
    /// Policy area of the chunk.
    pub policy_area: Option<String>,
}

/// One pattern of a signal pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPattern {
    /// Stable pattern id.
    pub id: String,
    /// Pattern text (regex source or substring).
    pub text: String,
    /// Match mode.
    pub match_mode: MatchMode,
    /// Confidence weight in [0, 1].
    pub weight: f64,
    /// Category tag.
    pub category: String,
    /// Semantic-expansion synonyms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expansions: Vec<String>,
    /// Context predicates.
    #[serde(default)]
    pub context: ContextPredicates,
    /// Elements the pattern expects to find.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_elements: Option<SchemaSpec>,
    /// Failure-contract declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_contract: Option<String>,
    /// Policy area the pattern was declared under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_area_id: Option<String>,
}

/// Filtering statistics returned with every context filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    /// Patterns in the pack before filtering.
    pub total: usize,
    /// Patterns whose predicates were satisfied.
    pub kept: usize,
    /// Patterns dropped by context predicates.
    pub dropped_by_context: usize,
}

/// A per-policy-area signal pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPack {
    /// Policy area this pack covers.
    pub policy_area: PolicyArea,
    /// Pack version string.
    pub version: String,
    /// Patterns in declaration order.
    pub patterns: Vec<SignalPattern>,
    /// BLAKE3 fingerprint of the monolith slice the pack was built from.
    pub source_fingerprint: String,
    /// Validity window start (ISO date), if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    /// Validity window end (ISO date), if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    /// Cache TTL in seconds.
    pub ttl_s: u64,
}

impl SignalPack {
    /// Filters patterns to those whose context predicates are satisfied.
    ///
    /// Preserves declaration order and returns filtering statistics.
    #[must_use]
    pub fn filter_for_context(&self, context: &ChunkContext) -> (Vec<SignalPattern>, FilterStats) {
        let total = self.patterns.len();
        let kept: Vec<SignalPattern> = self
            .patterns
            .iter()
            .filter(|p| p.context.satisfied_by(context))
            .cloned()
            .collect();
        let stats = FilterStats {
            total,
            kept: kept.len(),
            dropped_by_context: total - kept.len(),
        };
        (kept, stats)
    }
}

/// A signal resolved for a chunk, typed by its signal kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSignal {
    /// Signal type tag.
    pub signal_type: String,
    /// Signal name (unique within its type for a chunk).
    pub name: String,
    /// Type-specific payload.
    pub payload: Value,
}

/// Required payload fields per signal type.
///
/// Irrigation Phase 5 validates each resolved signal against this table;
/// a missing field is a hard stop.
#[must_use]
pub fn required_payload_fields(signal_type: &str) -> &'static [&'static str] {
    match signal_type {
        "patterns" => &["patterns", "count"],
        "expansions" => &["synonyms"],
        "expected_elements" => &["elements"],
        "failure_contract" => &["contract"],
        _ => &[],
    }
}
