//! Modality scorers.
//!
//! Validation is decoupled from scoring: `validate_evidence` raises typed
//! errors and `score_evidence` assumes validated input. A scorer never
//! returns a default score on invalid evidence.
//!
//! The shared core is `confidence x completeness x max_score`; modalities
//! with an extra required key fold it in as a factor:
//!
//! - `TYPE_B`: zero extracted paths collapse the score (no chain, no
//!   theory of change).
//! - `TYPE_C`: contradiction count is inverted, `1 / (1 + n)`.
//! - `TYPE_E`: the traced budget ratio scales the score directly.
//! - `TYPE_F`: the mechanism plausibility scales the score directly.
//! - `TYPE_A` / `TYPE_D`: the shared core alone; `matches` is validated
//!   and recorded in metadata for `TYPE_D`.

use crate::error::{Result, ScoringError};
use crate::scoring::canonical::canonical_digest;
use crate::scoring::modality::{ModalityConfig, QualityThresholds, round_decimal};
use crate::scoring::modality::Modality;
use serde_json::Value;
use std::collections::BTreeMap;

/// The outcome of scoring one evidence dict.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    /// Raw score, clamped to the modality range and rounded.
    pub raw: f64,
    /// Normalized score in [0, 1] (`raw / max_score`).
    pub normalized: f64,
    /// SHA-256 of the canonical evidence JSON.
    pub evidence_hash: String,
    /// Element counts and clamping flags.
    pub metadata: BTreeMap<String, Value>,
}

/// Validates an evidence dict against a modality configuration.
///
/// # Errors
///
/// Returns a typed error naming the modality and the missing or malformed
/// key. Never silently coerces.
pub fn validate_evidence(evidence: &Value, config: &ModalityConfig) -> Result<()> {
    let map = evidence.as_object().ok_or_else(|| ScoringError::EvidenceInvalid {
        modality: config.modality.to_string(),
        reason: "evidence must be a JSON object".to_string(),
    })?;

    for key in &config.required_keys {
        if !map.contains_key(key) {
            return Err(ScoringError::MissingKey {
                modality: config.modality.to_string(),
                key: key.clone(),
            }
            .into());
        }
    }

    if !map.get("elements").is_some_and(Value::is_array) {
        return Err(ScoringError::EvidenceInvalid {
            modality: config.modality.to_string(),
            reason: "\"elements\" must be an array".to_string(),
        }
        .into());
    }

    let confidence = map
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| ScoringError::EvidenceInvalid {
            modality: config.modality.to_string(),
            reason: "\"confidence\" must be a number".to_string(),
        })?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ScoringError::EvidenceInvalid {
            modality: config.modality.to_string(),
            reason: format!("\"confidence\" {confidence} outside [0, 1]"),
        }
        .into());
    }

    match config.modality {
        Modality::TypeB => require_count(map, "paths", config)?,
        Modality::TypeC => require_count(map, "contradictions", config)?,
        Modality::TypeD => require_count(map, "matches", config)?,
        Modality::TypeE => require_ratio(map, "traced_ratio", config)?,
        Modality::TypeF => require_ratio(map, "plausibility", config)?,
        Modality::TypeA => {}
    }

    Ok(())
}

fn require_count(
    map: &serde_json::Map<String, Value>,
    key: &str,
    config: &ModalityConfig,
) -> Result<()> {
    let value = map.get(key).and_then(Value::as_u64);
    if value.is_none() {
        return Err(ScoringError::EvidenceInvalid {
            modality: config.modality.to_string(),
            reason: format!("{key:?} must be a non-negative integer"),
        }
        .into());
    }
    Ok(())
}

fn require_ratio(
    map: &serde_json::Map<String, Value>,
    key: &str,
    config: &ModalityConfig,
) -> Result<()> {
    let value = map.get(key).and_then(Value::as_f64);
    match value {
        Some(v) if (0.0..=1.0).contains(&v) => Ok(()),
        Some(v) => Err(ScoringError::EvidenceInvalid {
            modality: config.modality.to_string(),
            reason: format!("{key:?} {v} outside [0, 1]"),
        }
        .into()),
        None => Err(ScoringError::EvidenceInvalid {
            modality: config.modality.to_string(),
            reason: format!("{key:?} must be a number"),
        }
        .into()),
    }
}

/// Scores validated evidence deterministically.
///
/// # Errors
///
/// Returns an error if validation fails or canonicalization fails; the
/// two steps run in sequence so callers may skip a separate
/// `validate_evidence` call.
#[allow(clippy::cast_precision_loss)]
pub fn score_evidence(evidence: &Value, config: &ModalityConfig) -> Result<ScoreOutcome> {
    validate_evidence(evidence, config)?;

    let map = evidence.as_object().ok_or_else(|| ScoringError::EvidenceInvalid {
        modality: config.modality.to_string(),
        reason: "evidence must be a JSON object".to_string(),
    })?;

    let element_count = map.get("elements").and_then(Value::as_array).map_or(0, Vec::len);
    let confidence = map.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    let completeness = (element_count as f64 / config.expected_elements as f64).min(1.0);

    let modality_factor = match config.modality {
        Modality::TypeA | Modality::TypeD => 1.0,
        Modality::TypeB => {
            let paths = map.get("paths").and_then(Value::as_u64).unwrap_or(0);
            if paths > 0 { 1.0 } else { 0.0 }
        }
        Modality::TypeC => {
            let contradictions = map.get("contradictions").and_then(Value::as_u64).unwrap_or(0);
            1.0 / (1.0 + contradictions as f64)
        }
        Modality::TypeE => map.get("traced_ratio").and_then(Value::as_f64).unwrap_or(0.0),
        Modality::TypeF => map.get("plausibility").and_then(Value::as_f64).unwrap_or(0.0),
    };

    let unclamped = confidence * completeness * modality_factor * config.max_score;
    let clamped = unclamped.clamp(config.min_score, config.max_score);
    let raw = round_decimal(clamped, config.precision, config.rounding);
    let normalized = round_decimal(raw / config.max_score, config.precision, config.rounding);

    let mut metadata = BTreeMap::new();
    metadata.insert("element_count".to_string(), Value::from(element_count));
    metadata.insert(
        "expected_elements".to_string(),
        Value::from(config.expected_elements),
    );
    metadata.insert(
        "clamped".to_string(),
        Value::from((unclamped - clamped).abs() > f64::EPSILON),
    );
    if config.modality == Modality::TypeD {
        metadata.insert(
            "matches".to_string(),
            map.get("matches").cloned().unwrap_or(Value::Null),
        );
    }

    Ok(ScoreOutcome {
        raw,
        normalized,
        evidence_hash: canonical_digest(evidence)?,
        metadata,
    })
}

/// Scores evidence and assigns the quality level in one call.
///
/// # Errors
///
/// Propagates validation and canonicalization errors.
pub fn score_with_quality(
    evidence: &Value,
    config: &ModalityConfig,
    thresholds: &QualityThresholds,
) -> Result<(ScoreOutcome, crate::scoring::modality::QualityLevel)> {
    let outcome = score_evidence(evidence, config)?;
    let level = thresholds.level_for(outcome.normalized);
    Ok((outcome, level))
}
