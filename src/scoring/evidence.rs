//! Evidence envelope passed from executor to scorer.
//!
//! The envelope binds a content dict to its canonical digest plus the run
//! identifiers. Two envelopes over the same semantic content have equal
//! digests regardless of key insertion order.

use crate::error::Result;
use crate::scoring::canonical::canonical_digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An evidence envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEnvelope {
    /// The evidence content dict.
    pub content: Value,
    /// SHA-256 of the canonical (sort-keyed) JSON of `content`.
    pub content_digest: String,
    /// Policy unit the run belongs to.
    pub policy_unit_id: String,
    /// Run correlation id.
    pub correlation_id: String,
    /// Unique event id within the run.
    pub event_id: String,
    /// UTC timestamp of envelope creation.
    pub timestamp: DateTime<Utc>,
}

impl EvidenceEnvelope {
    /// Creates an envelope, computing the content digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be canonicalized.
    pub fn new(
        content: Value,
        policy_unit_id: impl Into<String>,
        correlation_id: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Result<Self> {
        let content_digest = canonical_digest(&content)?;
        Ok(Self {
            content,
            content_digest,
            policy_unit_id: policy_unit_id.into(),
            correlation_id: correlation_id.into(),
            event_id: event_id.into(),
            timestamp: Utc::now(),
        })
    }

    /// Re-verifies that the digest still matches the content.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be canonicalized.
    pub fn verify(&self) -> Result<bool> {
        Ok(canonical_digest(&self.content)? == self.content_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_digest_is_order_independent() {
        let mut a = serde_json::Map::new();
        a.insert("elements".to_string(), json!([1, 2]));
        a.insert("confidence".to_string(), json!(0.8));
        let mut b = serde_json::Map::new();
        b.insert("confidence".to_string(), json!(0.8));
        b.insert("elements".to_string(), json!([1, 2]));

        let env_a = EvidenceEnvelope::new(Value::Object(a), "pu-1", "corr-1", "ev-1").unwrap();
        let env_b = EvidenceEnvelope::new(Value::Object(b), "pu-1", "corr-1", "ev-2").unwrap();
        assert_eq!(env_a.content_digest, env_b.content_digest);
    }

    #[test]
    fn test_envelope_verify() {
        let mut env =
            EvidenceEnvelope::new(json!({"k": 1}), "pu-1", "corr-1", "ev-1").unwrap();
        assert!(env.verify().unwrap());
        env.content = json!({"k": 2});
        assert!(!env.verify().unwrap());
    }

    #[test]
    fn test_envelope_carries_identifiers() {
        let env = EvidenceEnvelope::new(json!({}), "pu-9", "corr-9", "ev-9").unwrap();
        assert_eq!(env.policy_unit_id, "pu-9");
        assert_eq!(env.correlation_id, "corr-9");
        assert_eq!(env.event_id, "ev-9");
    }
}
