//! Scored results.
//!
//! A `ScoredResult` is immutable: fields are private and exposed through
//! getters only, so nothing downstream can rewrite a score after the
//! evidence hash has been recorded.

use crate::ids::{BaseSlot, Dimension, PolicyArea};
use crate::scoring::modality::{Modality, QualityLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The scored outcome of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    question_global: u32,
    base_slot: BaseSlot,
    policy_area: PolicyArea,
    dimension: Dimension,
    modality: Modality,
    raw_score: f64,
    normalized_score: f64,
    quality: QualityLevel,
    evidence_hash: String,
    metadata: BTreeMap<String, Value>,
    timestamp: DateTime<Utc>,
}

impl ScoredResult {
    /// Creates a scored result. Construction is the only mutation point.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        question_global: u32,
        base_slot: BaseSlot,
        policy_area: PolicyArea,
        dimension: Dimension,
        modality: Modality,
        raw_score: f64,
        normalized_score: f64,
        quality: QualityLevel,
        evidence_hash: String,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            question_global,
            base_slot,
            policy_area,
            dimension,
            modality,
            raw_score,
            normalized_score,
            quality,
            evidence_hash,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Global question id (1..=300).
    #[must_use]
    pub const fn question_global(&self) -> u32 {
        self.question_global
    }

    /// Executor base slot.
    #[must_use]
    pub const fn base_slot(&self) -> BaseSlot {
        self.base_slot
    }

    /// Policy area of the question.
    #[must_use]
    pub const fn policy_area(&self) -> PolicyArea {
        self.policy_area
    }

    /// Dimension of the question.
    #[must_use]
    pub const fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Scoring modality.
    #[must_use]
    pub const fn modality(&self) -> Modality {
        self.modality
    }

    /// Raw score within the modality's declared range.
    #[must_use]
    pub const fn raw_score(&self) -> f64 {
        self.raw_score
    }

    /// Normalized score in [0, 1].
    #[must_use]
    pub const fn normalized_score(&self) -> f64 {
        self.normalized_score
    }

    /// Assigned quality level.
    #[must_use]
    pub const fn quality(&self) -> QualityLevel {
        self.quality
    }

    /// SHA-256 of the canonical evidence JSON.
    #[must_use]
    pub fn evidence_hash(&self) -> &str {
        &self.evidence_hash
    }

    /// Scorer metadata: element counts, clamping flags.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// UTC timestamp of scoring.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
