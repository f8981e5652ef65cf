//! Scoring engine.
//!
//! Six modality-typed deterministic scorers with evidence-hashed
//! reproducibility. Evidence validation is decoupled from scoring: a
//! scorer never returns zero to mask a validation failure.

pub mod canonical;
pub mod evidence;
pub mod modality;
pub mod result;
pub mod scorer;

pub use canonical::{canonical_json, sha256_hex};
pub use evidence::EvidenceEnvelope;
pub use modality::{
    Modality, ModalityConfig, ModalityTable, QualityLevel, QualityThresholds, RoundingMode,
};
pub use result::ScoredResult;
pub use scorer::{ScoreOutcome, score_evidence, score_with_quality, validate_evidence};
