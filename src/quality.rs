//! Quality gates for the ingestion pipeline.
//!
//! Six hard invariants evaluated at the end of Phase 9. Any failure is
//! fatal: the ABORT diagnostic names the gate, its measured value, the
//! threshold, and prescriptive guidance.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};

/// Measured quality metrics of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Fraction of tokens with complete provenance. Must be 1.0.
    pub provenance_completeness: f64,
    /// Fraction of chunks satisfying the nesting invariant. Must be 1.0.
    pub structural_consistency: f64,
    /// Fraction of KPIs linked to an originating chunk.
    pub kpi_linkage_rate: f64,
    /// Fraction of budget rows that balance within tolerance.
    pub budget_consistency_score: f64,
    /// Boundary detection F1 against the sentence-boundary heuristic.
    pub boundary_f1: f64,
    /// Measured MICRO chunk overlap ratio.
    pub chunk_overlap: f64,
}

/// Gate thresholds, loaded from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Required provenance completeness (exact).
    pub provenance_completeness: f64,
    /// Required structural consistency (exact).
    pub structural_consistency: f64,
    /// Minimum KPI linkage rate.
    pub kpi_linkage_rate: f64,
    /// Minimum budget consistency score.
    pub budget_consistency_score: f64,
    /// Minimum boundary F1.
    pub boundary_f1: f64,
    /// Maximum MICRO chunk overlap.
    pub chunk_overlap: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            provenance_completeness: 1.0,
            structural_consistency: 1.0,
            kpi_linkage_rate: 0.80,
            budget_consistency_score: 0.95,
            boundary_f1: 0.85,
            chunk_overlap: 0.15,
        }
    }
}

/// Tolerance for the two exact-equality gates. Metric computations are
/// ratios of integer counts, so anything below this is floating-point
/// noise, not a real incompleteness.
const EXACT_EPSILON: f64 = 1e-12;

/// One gate evaluation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateOutcome {
    /// Gate name.
    pub gate: &'static str,
    /// Measured value.
    pub measured: f64,
    /// Configured threshold.
    pub threshold: f64,
    /// Whether the gate passed.
    pub passed: bool,
}

impl GateThresholds {
    /// Evaluates all six gates against measured metrics.
    ///
    /// Returns one outcome per gate, in the canonical gate order.
    #[must_use]
    pub fn evaluate(&self, metrics: &QualityMetrics) -> Vec<GateOutcome> {
        let exact = |measured: f64, threshold: f64| (measured - threshold).abs() <= EXACT_EPSILON;
        vec![
            GateOutcome {
                gate: "provenance_completeness",
                measured: metrics.provenance_completeness,
                threshold: self.provenance_completeness,
                passed: exact(metrics.provenance_completeness, self.provenance_completeness),
            },
            GateOutcome {
                gate: "structural_consistency",
                measured: metrics.structural_consistency,
                threshold: self.structural_consistency,
                passed: exact(metrics.structural_consistency, self.structural_consistency),
            },
            GateOutcome {
                gate: "kpi_linkage_rate",
                measured: metrics.kpi_linkage_rate,
                threshold: self.kpi_linkage_rate,
                passed: metrics.kpi_linkage_rate >= self.kpi_linkage_rate,
            },
            GateOutcome {
                gate: "budget_consistency_score",
                measured: metrics.budget_consistency_score,
                threshold: self.budget_consistency_score,
                passed: metrics.budget_consistency_score >= self.budget_consistency_score,
            },
            GateOutcome {
                gate: "boundary_f1",
                measured: metrics.boundary_f1,
                threshold: self.boundary_f1,
                passed: metrics.boundary_f1 >= self.boundary_f1,
            },
            GateOutcome {
                gate: "chunk_overlap",
                measured: metrics.chunk_overlap,
                threshold: self.chunk_overlap,
                passed: metrics.chunk_overlap <= self.chunk_overlap,
            },
        ]
    }

    /// Enforces the gates: returns the first failure as a fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::GateFailed`] naming the gate, its measured
    /// value and guidance.
    pub fn enforce(&self, metrics: &QualityMetrics) -> Result<()> {
        for outcome in self.evaluate(metrics) {
            if !outcome.passed {
                return Err(IngestError::GateFailed {
                    gate: outcome.gate,
                    measured: outcome.measured,
                    threshold: outcome.threshold,
                    guidance: guidance_for(outcome.gate),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Prescriptive guidance attached to each gate's ABORT diagnostic.
fn guidance_for(gate: &str) -> &'static str {
    match gate {
        "provenance_completeness" => "re-run Phase 7; a parser adapter dropped token bindings",
        "structural_consistency" => "a chunk escaped its CONTAINS parent; inspect Phase 8 output",
        "kpi_linkage_rate" => "KPI rows could not be attached; check Phase 6 table classification",
        "budget_consistency_score" => "budget rows do not balance; verify the source tables or raise the tolerance",
        "boundary_f1" => "boundary detection degraded; widen the boundary search window",
        "chunk_overlap" => "reduce max_chunk_size or raise overlap_cap",
        _ => "inspect the ingestion diagnostics",
    }
}
