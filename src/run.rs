//! Document run orchestration.
//!
//! Sequences the nine ingestion phases and the downstream pipeline:
//! chunk matrix, irrigation, executor dispatch, scoring, aggregation,
//! verification manifest. A run is a pure function of (document,
//! monolith, config); the only shared state across documents is the
//! signal registry, which is internally synchronized.

use crate::aggregation::aggregate;
use crate::config::PipelineConfig;
use crate::content::store::DeclaredMetadata;
use crate::cpp::CanonPolicyPackage;
use crate::error::{Error, IrrigationError, Result};
use crate::executor::execute_task;
use crate::irrigation::{ExecutionPlan, IrrigationSynchronizer};
use crate::manifest::{Diagnostic, VerificationManifest};
use crate::matrix::ChunkMatrix;
use crate::parser::AdapterRegistry;
use crate::pipeline::{RunIdentity, run_ingestion};
use crate::scoring::{ScoredResult, score_with_quality};
use crate::signal::SignalRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::info;

/// Run-level cancellation token with an optional deadline.
///
/// Checked at every suspension point (document read, artifact writes,
/// registry load) and between executor method calls.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    started: Instant,
    timeout_s: Option<u64>,
}

impl CancelToken {
    /// A token that never expires on its own.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            timeout_s: None,
        }
    }

    /// A token with a document-level timeout; `0` disables the deadline.
    #[must_use]
    pub fn with_timeout(timeout_s: u64) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            timeout_s: (timeout_s > 0).then_some(timeout_s),
        }
    }

    /// Signals cancellation; observed at the next suspension point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checks for cancellation or deadline expiry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::Timeout`] naming the phase.
    pub fn check(&self, phase: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                phase: phase.to_string(),
            });
        }
        if let Some(timeout_s) = self.timeout_s {
            let elapsed_s = self.started.elapsed().as_secs();
            if elapsed_s >= timeout_s {
                return Err(Error::Timeout {
                    phase: phase.to_string(),
                    elapsed_s,
                });
            }
        }
        Ok(())
    }
}

/// Options for one document run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Policy unit the document belongs to.
    pub policy_unit_id: String,
    /// Correlation id; generated when absent.
    pub correlation_id: Option<String>,
    /// Output directory for the CPP and the verification manifest.
    pub out_dir: Option<PathBuf>,
    /// Declared document metadata.
    pub declared: DeclaredMetadata,
}

/// The per-worker document runner.
///
/// One instance per worker process; the signal registry is the only
/// component shared between runners.
pub struct DocumentRun {
    config: PipelineConfig,
    adapters: AdapterRegistry,
    registry: Arc<SignalRegistry>,
}

impl DocumentRun {
    /// Creates a runner over a validated configuration and a loaded
    /// signal registry.
    #[must_use]
    pub fn new(config: PipelineConfig, registry: Arc<SignalRegistry>) -> Self {
        Self {
            config,
            adapters: AdapterRegistry::new(),
            registry,
        }
    }

    /// Registers an additional parser adapter (PDF, DOCX).
    pub fn register_adapter(&mut self, adapter: Box<dyn crate::parser::ParserAdapter>) {
        self.adapters.register(adapter);
    }

    /// Executes a full run and returns the verification manifest.
    ///
    /// # Errors
    ///
    /// Any ABORT in any stage propagates; nothing is written to the
    /// output directory on failure except possibly the CPP, which is
    /// produced atomically before downstream stages run.
    pub fn execute<P: AsRef<Path>>(
        &self,
        document: P,
        options: &RunOptions,
    ) -> Result<VerificationManifest> {
        let correlation_id = options
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let identity = RunIdentity {
            policy_unit_id: options.policy_unit_id.clone(),
            correlation_id: correlation_id.clone(),
        };
        let cancel = CancelToken::with_timeout(self.config.timeout_s);
        let mut diagnostics = Vec::new();

        // Phases 1-9
        let package = run_ingestion(
            &document,
            &options.declared,
            &self.adapters,
            &self.config,
            &identity,
            &cancel,
        )?;
        diag(&mut diagnostics, "ingestion", &correlation_id, format!(
            "CPP packed: {} chunks, merkle root {}",
            package.graph.len(),
            package.integrity.merkle_root
        ));

        if let Some(out_dir) = &options.out_dir {
            cancel.check("cpp write")?;
            package.write_to_dir(out_dir.join("cpp"))?;
        }

        // Chunk matrix
        let matrix = ChunkMatrix::from_package(&package)?;
        diag(&mut diagnostics, "matrix", &correlation_id, format!(
            "chunk matrix built: {} cells",
            matrix.len()
        ));

        // Irrigation
        cancel.check("signal registry")?;
        let synchronizer =
            IrrigationSynchronizer::new(&matrix, &self.registry, correlation_id.clone());
        let plan = synchronizer.synchronize(self.registry.provider().questions())?;
        diag(&mut diagnostics, "irrigation", &correlation_id, format!(
            "execution plan ready: {} tasks, hash {}",
            plan.len(),
            plan.integrity_hash()
        ));

        // Dispatch and scoring, in plan order
        let results = self.execute_plan(&plan, &matrix, &identity, &cancel)?;
        diag(&mut diagnostics, "scoring", &correlation_id, format!(
            "{} results scored",
            results.len()
        ));

        // Aggregation
        let aggregates = aggregate(&results, &self.config.aggregation)?;
        diag(&mut diagnostics, "aggregation", &correlation_id, format!(
            "overall score {:.4}",
            aggregates.overall
        ));

        let stats = self.registry.stats();
        diag(&mut diagnostics, "signal-registry", &correlation_id, format!(
            "pack cache: {} hits, {} misses",
            stats.hits, stats.misses
        ));

        // Verification manifest
        let gate_outcomes = self.config.ingest.gates.evaluate(&package.manifest.quality);
        let manifest = VerificationManifest::assemble(
            options.policy_unit_id.clone(),
            correlation_id,
            package.manifest.source.source_hash.clone(),
            package.integrity.merkle_root.clone(),
            plan.integrity_hash().to_string(),
            plan.len(),
            &results,
            gate_outcomes,
            aggregates,
            diagnostics,
        );

        if let Some(out_dir) = &options.out_dir {
            cancel.check("manifest write")?;
            manifest.write(out_dir.join("verification_manifest.json"))?;
        }

        info!(success = manifest.success, "run complete");
        Ok(manifest)
    }

    /// Runs every task sequentially, scoring as results arrive.
    fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        matrix: &ChunkMatrix,
        identity: &RunIdentity,
        cancel: &CancelToken,
    ) -> Result<Vec<ScoredResult>> {
        let mut results = Vec::with_capacity(plan.len());
        for task in plan.tasks() {
            // Cancellation is observed between method sequences
            cancel.check(&format!("task {}", task.task_id()))?;

            let chunk = matrix
                .get(task.policy_area(), task.dimension())
                .ok_or_else(|| IrrigationError::RoutingFailed {
                    question_id: task.question_global(),
                    reason: format!("chunk {} vanished from matrix", task.target_chunk_id()),
                })?;

            let (evidence, log) =
                execute_task(task, chunk, &self.config.executor_memory_caps)?;
            let envelope = crate::scoring::EvidenceEnvelope::new(
                evidence,
                identity.policy_unit_id.clone(),
                identity.correlation_id.clone(),
                task.task_id().to_string(),
            )?;

            let modality_config = self.config.modalities.config_for(task.modality())?;
            let (outcome, quality) = score_with_quality(
                &envelope.content,
                modality_config,
                &self.config.modalities.quality,
            )?;

            let mut metadata = outcome.metadata;
            metadata.insert(
                "truncation_count".to_string(),
                serde_json::Value::from(log.truncations().len()),
            );
            metadata.insert(
                "invocation_count".to_string(),
                serde_json::Value::from(log.records.len()),
            );

            results.push(ScoredResult::new(
                task.question_global(),
                task.base_slot(),
                task.policy_area(),
                task.dimension(),
                task.modality(),
                outcome.raw,
                outcome.normalized,
                quality,
                outcome.evidence_hash,
                metadata,
            ));
        }
        Ok(results)
    }
}

fn diag(
    diagnostics: &mut Vec<Diagnostic>,
    component: &str,
    correlation_id: &str,
    message: String,
) {
    info!(component, %message);
    diagnostics.push(Diagnostic {
        component: component.to_string(),
        severity: "info".to_string(),
        message,
        correlation_id: correlation_id.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_unbounded_passes() {
        let token = CancelToken::unbounded();
        assert!(token.check("Phase 1").is_ok());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_token_cancel() {
        let token = CancelToken::unbounded();
        token.cancel();
        let err = token.check("Phase 9").unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(err.to_string().contains("Phase 9"));
    }

    #[test]
    fn test_cancel_token_clone_shares_state() {
        let token = CancelToken::unbounded();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let token = CancelToken::with_timeout(0);
        assert!(token.check("Phase 1").is_ok());
    }
}
