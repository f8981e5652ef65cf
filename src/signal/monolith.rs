//! Question monolith provider.
//!
//! The monolith is the single JSON file encoding the 300-question
//! evaluation instrument. This provider is the ONLY component that reads
//! it; every other consumer goes through the signal registry. The
//! provider verifies the declared schema version and integrity hash at
//! load and computes per-policy-area slice fingerprints for cache keying.

use crate::error::{Result, SignalError};
use crate::ids::PolicyArea;
use crate::schema::SchemaSpec;
use crate::scoring::canonical::canonical_json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Minimum supported monolith schema version.
pub const MIN_SCHEMA_VERSION: &str = "2.0.0";

/// Declared integrity block of the monolith.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonolithIntegrity {
    /// Declared BLAKE3 hash over the canonical question payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Set by the provider after verification.
    #[serde(default)]
    pub verified: bool,
}

/// The six sub-blocks of the monolith.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonolithBlocks {
    /// Method declarations.
    pub methods: Value,
    /// Dimension declarations.
    pub dimensions: Value,
    /// Indicator declarations.
    pub indicators: Value,
    /// Outcome declarations.
    pub outcomes: Value,
    /// Rule declarations.
    pub rules: Value,
    /// Constraint declarations.
    pub constraints: Value,
}

/// One micro-question of the instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    /// Global question id.
    pub question_global: u32,
    /// Executor base slot, raw form (`D1-Q1` or `D1Q1`).
    pub base_slot: String,
    /// Policy area id.
    pub policy_area_id: String,
    /// Dimension id, raw form (`D1` or `DIM01`).
    pub dimension_id: String,
    /// Cluster the question belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Pattern specifications (raw dicts; irrigation validates them).
    #[serde(default)]
    pub patterns: Vec<Value>,
    /// Expected-element schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_elements: Option<SchemaSpec>,
    /// Validation declarations (opaque to the core).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validations: Option<Value>,
    /// Scoring modality reference (`TYPE_A`..`TYPE_F`).
    pub scoring_modality: String,
    /// Signal types this question requires at irrigation time.
    #[serde(default)]
    pub required_signals: Vec<String>,
}

/// The parsed monolith document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionMonolith {
    /// Declared schema version.
    pub schema_version: String,
    /// Optional JSON-schema reference.
    #[serde(default, rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Integrity block.
    #[serde(default)]
    pub integrity: MonolithIntegrity,
    /// Canonical notation declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_notation: Option<String>,
    /// The six sub-blocks.
    #[serde(default)]
    pub blocks: MonolithBlocks,
    /// The micro-questions.
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
}

/// Loaded monolith plus derived fingerprints.
#[derive(Debug)]
pub struct MonolithProvider {
    monolith: QuestionMonolith,
    path: String,
    fingerprints: BTreeMap<PolicyArea, String>,
}

impl MonolithProvider {
    /// Loads the monolith from disk, verifying version and integrity.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, malformed, below the
    /// supported schema version, or fails its declared integrity hash.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let raw = std::fs::read_to_string(&path).map_err(|e| SignalError::MonolithUnreadable {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;
        let monolith: QuestionMonolith =
            serde_json::from_str(&raw).map_err(|e| SignalError::MonolithInvalid {
                reason: e.to_string(),
            })?;
        Self::from_monolith(monolith, path_str)
    }

    /// Builds a provider from an already-parsed monolith (tests, HTTP).
    ///
    /// # Errors
    ///
    /// Applies the same version and integrity checks as [`Self::load`].
    pub fn from_monolith(mut monolith: QuestionMonolith, path: String) -> Result<Self> {
        check_schema_version(&monolith.schema_version)?;

        let payload_hash = question_payload_hash(&monolith)?;
        if let Some(declared) = &monolith.integrity.hash {
            if *declared != payload_hash {
                return Err(SignalError::IntegrityMismatch {
                    declared: declared.clone(),
                    computed: payload_hash,
                }
                .into());
            }
            monolith.integrity.verified = true;
        }

        let mut fingerprints = BTreeMap::new();
        for pa in PolicyArea::all() {
            fingerprints.insert(pa, slice_fingerprint(&monolith, pa)?);
        }

        Ok(Self {
            monolith,
            path,
            fingerprints,
        })
    }

    /// Path the monolith was loaded from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All questions in declaration order.
    #[must_use]
    pub fn questions(&self) -> &[QuestionSpec] {
        &self.monolith.questions
    }

    /// The parsed monolith document.
    #[must_use]
    pub const fn monolith(&self) -> &QuestionMonolith {
        &self.monolith
    }

    /// Questions belonging to one policy area, in declaration order.
    #[must_use]
    pub fn questions_for(&self, pa: PolicyArea) -> Vec<&QuestionSpec> {
        let tag = pa.to_string();
        self.monolith
            .questions
            .iter()
            .filter(|q| q.policy_area_id == tag)
            .collect()
    }

    /// BLAKE3 fingerprint of one policy area's monolith slice.
    #[must_use]
    pub fn fingerprint_for(&self, pa: PolicyArea) -> &str {
        self.fingerprints
            .get(&pa)
            .map_or("", std::string::String::as_str)
    }
}

/// Checks `schema_version >= 2.0.0` by comparing the major component.
fn check_schema_version(version: &str) -> Result<()> {
    let major: Option<u32> = version.split('.').next().and_then(|m| m.parse().ok());
    match major {
        Some(m) if m >= 2 => Ok(()),
        _ => Err(SignalError::SchemaVersionTooOld {
            found: version.to_string(),
            required: MIN_SCHEMA_VERSION,
        }
        .into()),
    }
}

/// BLAKE3 over the canonical JSON of (blocks, questions).
fn question_payload_hash(monolith: &QuestionMonolith) -> Result<String> {
    let payload = serde_json::json!({
        "blocks": monolith.blocks,
        "questions": monolith.questions,
    });
    let canonical = canonical_json(&payload)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

/// BLAKE3 over the canonical JSON of one policy area's questions.
fn slice_fingerprint(monolith: &QuestionMonolith, pa: PolicyArea) -> Result<String> {
    let tag = pa.to_string();
    let slice: Vec<&QuestionSpec> = monolith
        .questions
        .iter()
        .filter(|q| q.policy_area_id == tag)
        .collect();
    let value = serde_json::to_value(&slice)?;
    let canonical = canonical_json(&value)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_monolith() -> QuestionMonolith {
        QuestionMonolith {
            schema_version: "2.0.0".to_string(),
            schema: None,
            integrity: MonolithIntegrity::default(),
            canonical_notation: Some("Dk-Qj".to_string()),
            blocks: MonolithBlocks::default(),
            questions: vec![QuestionSpec {
                question_global: 1,
                base_slot: "D1-Q1".to_string(),
                policy_area_id: "PA01".to_string(),
                dimension_id: "D1".to_string(),
                cluster_id: Some("CL01".to_string()),
                patterns: vec![json!({"policy_area_id": "PA01", "text": "presupuesto"})],
                expected_elements: None,
                validations: None,
                scoring_modality: "TYPE_A".to_string(),
                required_signals: vec!["patterns".to_string()],
            }],
        }
    }

    #[test]
    fn test_from_monolith_accepts_valid() {
        let provider =
            MonolithProvider::from_monolith(minimal_monolith(), "inline".to_string()).unwrap();
        assert_eq!(provider.questions().len(), 1);
        assert_eq!(provider.questions()[0].question_global, 1);
    }

    #[test]
    fn test_schema_version_floor() {
        let mut monolith = minimal_monolith();
        monolith.schema_version = "1.9.0".to_string();
        let err =
            MonolithProvider::from_monolith(monolith, "inline".to_string()).unwrap_err();
        assert!(err.to_string().contains("1.9.0"));
    }

    #[test]
    fn test_integrity_hash_verified() {
        let mut monolith = minimal_monolith();
        let hash = question_payload_hash(&monolith).unwrap();
        monolith.integrity.hash = Some(hash);
        let provider =
            MonolithProvider::from_monolith(monolith, "inline".to_string()).unwrap();
        assert!(provider.monolith().integrity.verified);
    }

    #[test]
    fn test_integrity_hash_mismatch_rejected() {
        let mut monolith = minimal_monolith();
        monolith.integrity.hash = Some("deadbeef".to_string());
        let err =
            MonolithProvider::from_monolith(monolith, "inline".to_string()).unwrap_err();
        assert!(err.to_string().contains("integrity hash mismatch"));
    }

    #[test]
    fn test_questions_for_filters_by_area() {
        let mut monolith = minimal_monolith();
        let mut q2 = monolith.questions[0].clone();
        q2.question_global = 31;
        q2.policy_area_id = "PA02".to_string();
        monolith.questions.push(q2);
        let provider =
            MonolithProvider::from_monolith(monolith, "inline".to_string()).unwrap();

        let pa1 = PolicyArea::new(1).unwrap();
        let pa2 = PolicyArea::new(2).unwrap();
        assert_eq!(provider.questions_for(pa1).len(), 1);
        assert_eq!(provider.questions_for(pa2).len(), 1);
        assert_eq!(provider.questions_for(PolicyArea::new(3).unwrap()).len(), 0);
    }

    #[test]
    fn test_fingerprints_differ_by_slice() {
        let mut monolith = minimal_monolith();
        let mut q2 = monolith.questions[0].clone();
        q2.question_global = 31;
        q2.policy_area_id = "PA02".to_string();
        q2.patterns = vec![json!({"policy_area_id": "PA02", "text": "meta"})];
        monolith.questions.push(q2);
        let provider =
            MonolithProvider::from_monolith(monolith, "inline".to_string()).unwrap();

        let f1 = provider.fingerprint_for(PolicyArea::new(1).unwrap());
        let f2 = provider.fingerprint_for(PolicyArea::new(2).unwrap());
        assert_ne!(f1, f2);
        assert!(!f1.is_empty());
    }

    #[test]
    fn test_fingerprint_stable_across_loads() {
        let a = MonolithProvider::from_monolith(minimal_monolith(), "a".to_string()).unwrap();
        let b = MonolithProvider::from_monolith(minimal_monolith(), "b".to_string()).unwrap();
        let pa = PolicyArea::new(1).unwrap();
        assert_eq!(a.fingerprint_for(pa), b.fingerprint_for(pa));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monolith.json");
        let content = serde_json::to_string(&minimal_monolith()).unwrap();
        std::fs::write(&path, content).unwrap();
        let provider = MonolithProvider::load(&path).unwrap();
        assert_eq!(provider.questions().len(), 1);
    }

    #[test]
    fn test_load_malformed_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monolith.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(MonolithProvider::load(&path).is_err());
    }
}
