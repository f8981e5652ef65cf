//! Verification manifest: the end-of-run integrity record.
//!
//! `success` is true only when every quality gate passed, the execution
//! plan had exactly 300 tasks, every scored result carries a non-default
//! evidence hash, and aggregation produced all expected cell scores.

use crate::aggregation::AggregateScores;
use crate::error::Result;
use crate::ids::QUESTION_COUNT;
use crate::io::write_file_atomic;
use crate::quality::GateOutcome;
use crate::scoring::ScoredResult;
use serde::Serialize;
use std::path::Path;

/// One structured diagnostic entry of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Component or phase that emitted the entry.
    pub component: String,
    /// Severity (`info`, `warn`, `error`).
    pub severity: String,
    /// Human-readable message.
    pub message: String,
    /// Run correlation id.
    pub correlation_id: String,
}

/// The verification manifest.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationManifest {
    /// Overall success flag.
    pub success: bool,
    /// Policy unit the run belongs to.
    pub policy_unit_id: String,
    /// Run correlation id.
    pub correlation_id: String,
    /// BLAKE3 of the ingestion source.
    pub source_hash: String,
    /// Merkle root of the CPP.
    pub cpp_merkle_root: String,
    /// Integrity hash of the execution plan.
    pub plan_integrity_hash: String,
    /// The 300 evidence hashes, sorted.
    pub evidence_hashes: Vec<String>,
    /// Gate outcomes in canonical order.
    pub gate_outcomes: Vec<GateOutcome>,
    /// Aggregation outputs.
    pub aggregates: AggregateScores,
    /// Full diagnostic log.
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationManifest {
    /// Assembles the manifest and evaluates the success conjunction.
    #[must_use]
    pub fn assemble(
        policy_unit_id: String,
        correlation_id: String,
        source_hash: String,
        cpp_merkle_root: String,
        plan_integrity_hash: String,
        plan_len: usize,
        results: &[ScoredResult],
        gate_outcomes: Vec<GateOutcome>,
        aggregates: AggregateScores,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let mut evidence_hashes: Vec<String> = results
            .iter()
            .map(|r| r.evidence_hash().to_string())
            .collect();
        evidence_hashes.sort();

        let gates_passed = gate_outcomes.iter().all(|g| g.passed);
        let plan_complete = plan_len == QUESTION_COUNT;
        let hashes_real = results.len() == QUESTION_COUNT
            && results.iter().all(|r| !r.evidence_hash().is_empty());
        let aggregation_complete =
            aggregates.dimensions.len() == 60 && aggregates.policy_areas.len() == 10;

        Self {
            success: gates_passed && plan_complete && hashes_real && aggregation_complete,
            policy_unit_id,
            correlation_id,
            source_hash,
            cpp_merkle_root,
            plan_integrity_hash,
            evidence_hashes,
            gate_outcomes,
            aggregates,
            diagnostics,
        }
    }

    /// Writes the manifest atomically as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_file_atomic(path, &json)
    }
}
