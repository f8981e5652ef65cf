//! Pipeline configuration.
//!
//! All thresholds (quality gates, modality ranges, aggregation weights,
//! cache parameters, memory caps) live in a single configuration document
//! loaded at startup. Validation happens at load time; a config that
//! would later fail an invariant is rejected before any work begins.

use crate::error::{Error, Result};
use crate::quality::GateThresholds;
use crate::scoring::ModalityTable;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tolerance for weight-sum validation.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Ingestion-phase options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Lower bound on MICRO chunk size in characters.
    pub min_chunk_size: usize,
    /// Upper bound on MICRO chunk size in characters.
    pub max_chunk_size: usize,
    /// MICRO overlap ceiling.
    pub overlap_cap: f64,
    /// Phase-5 OCR acceptance floor.
    pub ocr_confidence_threshold: f64,
    /// Layout confidence below which OCR is triggered.
    pub ocr_trigger_layout_confidence: f64,
    /// Relative tolerance for budget row balancing.
    pub budget_tolerance: f64,
    /// Quality gate thresholds.
    pub gates: GateThresholds,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 128,
            max_chunk_size: 2048,
            overlap_cap: 0.15,
            ocr_confidence_threshold: 0.85,
            ocr_trigger_layout_confidence: 0.70,
            budget_tolerance: 0.01,
            gates: GateThresholds::default(),
        }
    }
}

/// Signal registry cache options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Pack cache TTL in seconds.
    pub signal_cache_ttl_s: u64,
    /// Pack cache maximum entries.
    pub signal_cache_size: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            signal_cache_ttl_s: 600,
            signal_cache_size: 128,
        }
    }
}

/// Per-executor-class memory caps in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorMemoryCaps {
    /// Entity extraction arguments.
    pub entity: usize,
    /// DAG construction arguments.
    pub dag: usize,
    /// Causal-effect arguments.
    pub causal_effect: usize,
    /// Semantic analysis arguments.
    pub semantic: usize,
    /// Financial analysis arguments.
    pub financial: usize,
    /// Everything else.
    pub generic: usize,
}

impl Default for ExecutorMemoryCaps {
    fn default() -> Self {
        const MB: usize = 1024 * 1024;
        Self {
            entity: MB,
            dag: 5 * MB,
            causal_effect: 10 * MB,
            semantic: 2 * MB,
            financial: 2 * MB,
            generic: 5 * MB,
        }
    }
}

/// Aggregation options and weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Strict-mode flag: incomplete coverage aborts instead of warning.
    pub abort_on_insufficient_coverage: bool,
    /// Weights over the five questions of a (PA, DIM) cell.
    pub question_weights: Vec<f64>,
    /// Weights over the six dimensions of a policy area.
    pub dimension_weights: Vec<f64>,
    /// Weights over the ten policy areas.
    pub policy_area_weights: Vec<f64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            abort_on_insufficient_coverage: true,
            question_weights: vec![0.2; 5],
            dimension_weights: vec![1.0 / 6.0; 6],
            policy_area_weights: vec![0.1; 10],
        }
    }
}

/// The single configuration document for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ingestion options.
    pub ingest: IngestConfig,
    /// Signal cache options.
    pub signals: SignalConfig,
    /// Executor memory caps.
    pub executor_memory_caps: ExecutorMemoryCaps,
    /// Aggregation options.
    pub aggregation: AggregationConfig,
    /// Modality scorer table.
    pub modalities: ModalityTable,
    /// Base seed for derived tie-breaking seeds.
    pub seed: u64,
    /// Document-level timeout in seconds (0 disables).
    pub timeout_s: u64,
}

impl PipelineConfig {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, not valid JSON, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = crate::io::read_file(path)?;
        Self::from_json(&content)
    }

    /// Parses and validates a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or validation fails.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| Error::Config {
            message: format!("malformed configuration JSON: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every cross-field invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant with its location.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.min_chunk_size == 0 {
            return Err(Error::Config {
                message: "ingest.min_chunk_size must be positive".to_string(),
            });
        }
        if self.ingest.max_chunk_size <= self.ingest.min_chunk_size {
            return Err(Error::Config {
                message: format!(
                    "ingest.max_chunk_size {} must exceed min_chunk_size {}",
                    self.ingest.max_chunk_size, self.ingest.min_chunk_size
                ),
            });
        }
        for (name, value) in [
            ("ingest.overlap_cap", self.ingest.overlap_cap),
            (
                "ingest.ocr_confidence_threshold",
                self.ingest.ocr_confidence_threshold,
            ),
            (
                "ingest.ocr_trigger_layout_confidence",
                self.ingest.ocr_trigger_layout_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config {
                    message: format!("{name} {value} outside [0, 1]"),
                });
            }
        }
        if self.ingest.budget_tolerance < 0.0 {
            return Err(Error::Config {
                message: "ingest.budget_tolerance must be non-negative".to_string(),
            });
        }

        validate_weights("aggregation.question_weights", &self.aggregation.question_weights, 5)?;
        validate_weights(
            "aggregation.dimension_weights",
            &self.aggregation.dimension_weights,
            6,
        )?;
        validate_weights(
            "aggregation.policy_area_weights",
            &self.aggregation.policy_area_weights,
            10,
        )?;

        self.modalities.validate()?;

        Ok(())
    }
}

/// Validates a weight vector: fixed arity, non-negative entries, sum 1.0.
fn validate_weights(name: &str, weights: &[f64], arity: usize) -> Result<()> {
    if weights.len() != arity {
        return Err(Error::Config {
            message: format!("{name} must have {arity} entries, found {}", weights.len()),
        });
    }
    if weights.iter().any(|w| *w < 0.0) {
        return Err(Error::Config {
            message: format!("{name} entries must be non-negative"),
        });
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
        return Err(Error::Config {
            message: format!("{name} sums to {sum}, expected 1.0 +/- {WEIGHT_SUM_EPSILON}"),
        });
    }
    Ok(())
}
