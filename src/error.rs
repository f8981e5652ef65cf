//! Error types for Canon Policy Package operations.
//!
//! This module provides a comprehensive error hierarchy using `thiserror` for
//! all pipeline operations including ingestion, irrigation, scoring and
//! aggregation. Every variant carries the identifiers needed to locate the
//! failure (phase, gate, question, chunk, task, path) so diagnostics can be
//! logged structurally.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Ingestion-phase errors (Phases 1-9 and quality gates).
    #[error("ingestion error: {0}")]
    Ingest(#[from] IngestError),

    /// Chunk-matrix contract errors.
    #[error("chunk matrix error: {0}")]
    Matrix(#[from] MatrixError),

    /// Signal registry errors.
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    /// Irrigation synchronizer errors.
    #[error("irrigation error: {0}")]
    Irrigation(#[from] IrrigationError),

    /// Executor dispatch errors.
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Scoring engine errors.
    #[error("scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// Aggregation errors.
    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// I/O errors (file operations, artifact reads and writes).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The run was cancelled via its cancellation token.
    #[error("run cancelled during {phase}")]
    Cancelled {
        /// Phase or component that observed the cancellation.
        phase: String,
    },

    /// The document-level timeout expired.
    #[error("run timed out after {elapsed_s}s during {phase}")]
    Timeout {
        /// Phase that observed the expiry.
        phase: String,
        /// Seconds elapsed when the deadline was hit.
        elapsed_s: u64,
    },
}

/// Ingestion-specific errors for the nine-phase pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    /// A phase postcondition did not hold.
    #[error("ABORT in {phase}: {reason}")]
    PhaseFailed {
        /// Phase that failed (e.g. "Phase 4").
        phase: &'static str,
        /// Reason the postcondition did not hold.
        reason: String,
    },

    /// A quality gate failed at the end of Phase 9.
    #[error("ABORT in Phase 9: {gate}={measured:.4} violates threshold {threshold:.4} - {guidance}")]
    GateFailed {
        /// Name of the failed gate.
        gate: &'static str,
        /// Measured metric value.
        measured: f64,
        /// Configured threshold.
        threshold: f64,
        /// Prescriptive guidance for the operator.
        guidance: &'static str,
    },

    /// The parser adapter produced no pages.
    #[error("ABORT in Phase 2: parser {parser_id} produced no pages")]
    EmptyDocument {
        /// Identifier of the adapter.
        parser_id: String,
    },

    /// No parser adapter is registered for the detected format.
    #[error("no parser adapter registered for MIME type {mime}")]
    UnsupportedFormat {
        /// Detected MIME type.
        mime: String,
    },

    /// An OCR token fell below the acceptance threshold.
    #[error(
        "ABORT in Phase 5: OCR token {token_id} confidence {confidence:.3} below threshold {threshold:.3}"
    )]
    OcrBelowThreshold {
        /// Token that failed acceptance.
        token_id: String,
        /// Measured confidence.
        confidence: f64,
        /// Configured acceptance floor.
        threshold: f64,
    },

    /// A budget row did not balance within the configured tolerance.
    #[error("ABORT in Phase 6: budget row {row_id} imbalance {imbalance:.4} exceeds tolerance {tolerance:.4}")]
    BudgetImbalance {
        /// Identifier of the offending row.
        row_id: String,
        /// Relative imbalance of the row.
        imbalance: f64,
        /// Configured tolerance.
        tolerance: f64,
    },

    /// A KPI row is missing one of its required attributes.
    #[error("ABORT in Phase 6: KPI row {row_id} missing required attribute {attribute}")]
    KpiIncomplete {
        /// Identifier of the offending row.
        row_id: String,
        /// Missing attribute name.
        attribute: &'static str,
    },

    /// A chunk-graph invariant was violated.
    #[error("chunk graph invariant violated: {reason} (chunk {chunk_id})")]
    GraphInvariant {
        /// Offending chunk id.
        chunk_id: String,
        /// Violated invariant.
        reason: String,
    },

    /// CPP artifact serialization failed.
    #[error("ABORT in Phase 9: failed to serialize {artifact}: {reason}")]
    PackFailed {
        /// Artifact being written.
        artifact: &'static str,
        /// Reason for the failure.
        reason: String,
    },

    /// A loaded CPP failed integrity verification.
    #[error("CPP integrity mismatch: stored Merkle root {stored} != recomputed {recomputed}")]
    IntegrityMismatch {
        /// Merkle root recorded in `integrity.json`.
        stored: String,
        /// Merkle root recomputed from chunk hashes.
        recomputed: String,
    },
}

/// Chunk-matrix contract errors.
///
/// Each leaf validation raises a single typed error naming the offending
/// chunk index and its (policy area, dimension) identity. The builder
/// batch-collects these before aborting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    /// A chunk structure is malformed (empty text, non-string field, null).
    #[error("chunk {index} ({pa}/{dim}): malformed structure: {reason}")]
    MalformedChunk {
        /// Index of the chunk in the input.
        index: usize,
        /// Policy area identity, if known.
        pa: String,
        /// Dimension identity, if known.
        dim: String,
        /// What is malformed.
        reason: String,
    },

    /// A chunk id does not match the `PA{NN}-DIM{NN}` grammar.
    #[error("chunk {index}: invalid chunk_id {chunk_id:?}")]
    InvalidChunkId {
        /// Index of the chunk in the input.
        index: usize,
        /// The offending id.
        chunk_id: String,
    },

    /// The chunk id disagrees with its (policy area, dimension) fields.
    #[error("chunk {index}: chunk_id {chunk_id:?} != {pa}-{dim}")]
    IdFieldMismatch {
        /// Index of the chunk in the input.
        index: usize,
        /// The declared chunk id.
        chunk_id: String,
        /// The policy area field.
        pa: String,
        /// The dimension field.
        dim: String,
    },

    /// Two chunks share the same (policy area, dimension) key.
    #[error("chunk {index}: duplicate cell {pa}-{dim} (first seen at {first_index})")]
    DuplicateCell {
        /// Index of the later chunk.
        index: usize,
        /// Index of the first occupant.
        first_index: usize,
        /// Policy area of the duplicated cell.
        pa: String,
        /// Dimension of the duplicated cell.
        dim: String,
    },

    /// A cell of the 60-combination cross product is missing.
    #[error("missing cell {pa}-{dim}")]
    MissingCell {
        /// Policy area of the missing cell.
        pa: String,
        /// Dimension of the missing cell.
        dim: String,
    },

    /// The total chunk count is not exactly 60.
    #[error("expected exactly 60 chunks, found {found}")]
    WrongCardinality {
        /// Number of chunks seen.
        found: usize,
    },

    /// Batch wrapper: multiple contract violations collected together.
    #[error("{total} matrix contract violations ({shown} shown): {}", first.join("; "))]
    Batch {
        /// Total number of violations.
        total: usize,
        /// How many are rendered.
        shown: usize,
        /// Rendered messages of the first violations (up to ten).
        first: Vec<String>,
    },
}

/// Signal registry errors.
#[derive(Error, Debug)]
pub enum SignalError {
    /// The monolith file could not be read.
    #[error("failed to read question monolith at {path}: {reason}")]
    MonolithUnreadable {
        /// Path to the monolith file.
        path: String,
        /// Reason for the failure.
        reason: String,
    },

    /// The monolith is structurally invalid.
    #[error("invalid question monolith: {reason}")]
    MonolithInvalid {
        /// What is invalid.
        reason: String,
    },

    /// The monolith schema version is below the supported floor.
    #[error("monolith schema_version {found} is below required {required}")]
    SchemaVersionTooOld {
        /// Declared version.
        found: String,
        /// Minimum supported version.
        required: &'static str,
    },

    /// The monolith's declared integrity hash does not match its content.
    #[error("monolith integrity hash mismatch: declared {declared}, computed {computed}")]
    IntegrityMismatch {
        /// Hash declared in the monolith.
        declared: String,
        /// Hash computed over the content.
        computed: String,
    },

    /// No signal pack exists for the requested policy area.
    #[error("no signal pack for policy area {policy_area}")]
    PackNotFound {
        /// Requested policy area.
        policy_area: String,
    },

    /// A pattern specification inside the monolith is malformed.
    #[error("malformed pattern {pattern_id} in policy area {policy_area}: {reason}")]
    MalformedPattern {
        /// Pattern identifier.
        pattern_id: String,
        /// Policy area of the pack.
        policy_area: String,
        /// What is malformed.
        reason: String,
    },

    /// HTTP signal fetch failed after retries (feature `signal-http`).
    #[error("signal fetch for {policy_area} failed: {reason}")]
    FetchFailed {
        /// Requested policy area.
        policy_area: String,
        /// Reason for the failure.
        reason: String,
    },

    /// The circuit breaker is open (feature `signal-http`).
    #[error("signal circuit open for {remaining_s}s after {failures} failures")]
    CircuitOpen {
        /// Consecutive failures recorded.
        failures: u32,
        /// Seconds until the circuit half-opens.
        remaining_s: u64,
    },
}

/// Irrigation synchronizer errors.
#[derive(Error, Debug)]
pub enum IrrigationError {
    /// A question failed structural validation during extraction.
    #[error("question {question_id}: {reason}")]
    InvalidQuestion {
        /// Global question id (or its raw text if unparsable).
        question_id: String,
        /// What failed validation.
        reason: String,
    },

    /// Chunk routing failed for a question.
    #[error("question {question_id}: routing failed: {reason}")]
    RoutingFailed {
        /// Global question id.
        question_id: u32,
        /// Missing field, missing chunk, or verification mismatch.
        reason: String,
    },

    /// A pattern entry was structurally invalid during filtering.
    #[error("question {question_id}: pattern {pattern_index}: {reason}")]
    InvalidPattern {
        /// Global question id.
        question_id: u32,
        /// Index of the offending pattern in the question's list.
        pattern_index: usize,
        /// What is invalid.
        reason: String,
    },

    /// A required signal could not be resolved (hard stop).
    #[error("question {question_id}: required signal {signal_type} unresolved: {reason}")]
    SignalUnresolved {
        /// Global question id.
        question_id: u32,
        /// The required signal type.
        signal_type: String,
        /// Why resolution failed.
        reason: String,
    },

    /// Question and chunk schemas are incompatible.
    #[error("question {question_id}: schema incompatible at element {element_index}: {reason}")]
    SchemaIncompatible {
        /// Global question id.
        question_id: u32,
        /// Index of the offending element (or key position for dicts).
        element_index: usize,
        /// Which rule failed.
        reason: String,
    },

    /// A task carried an empty routing field into construction.
    #[error("task {task_id}: empty routing field {field}")]
    EmptyTaskField {
        /// Task id being constructed.
        task_id: String,
        /// Name of the empty field.
        field: &'static str,
    },

    /// Duplicate task id within the plan.
    #[error("duplicate task id {task_id} in execution plan")]
    DuplicateTask {
        /// The duplicated id.
        task_id: String,
    },

    /// The plan does not contain exactly 300 tasks.
    #[error("execution plan has {found} tasks, expected exactly {expected}")]
    PlanCardinality {
        /// Number of tasks assembled.
        found: usize,
        /// Required cardinality.
        expected: usize,
    },
}

/// Executor dispatch errors.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// No method sequence is declared for a base slot.
    #[error("no method sequence for base slot {slot}")]
    UnknownSlot {
        /// The unrecognized slot.
        slot: String,
    },

    /// A method named in a sequence is not in the registry.
    #[error("method {class}::{method} not registered")]
    UnknownMethod {
        /// Class name from the sequence.
        class: String,
        /// Method name from the sequence.
        method: String,
    },

    /// An argument alias could not be resolved from the context.
    #[error("task {task_id}: cannot resolve argument {alias} for {class}::{method}")]
    UnresolvedArgument {
        /// Task being executed.
        task_id: String,
        /// The alias that failed to resolve.
        alias: String,
        /// Class name of the invocation.
        class: String,
        /// Method name of the invocation.
        method: String,
    },

    /// A method failed on correctly-resolved arguments with no declared fallback.
    #[error("task {task_id}: {class}::{method} failed: {reason}")]
    MethodFailed {
        /// Task being executed.
        task_id: String,
        /// Class name of the invocation.
        class: String,
        /// Method name of the invocation.
        method: String,
        /// Failure reason.
        reason: String,
    },
}

/// Scoring engine errors.
#[derive(Error, Debug)]
pub enum ScoringError {
    /// Evidence failed structural validation for its modality.
    ///
    /// A scorer never masks this as a zero score; validation failures
    /// always propagate.
    #[error("modality {modality}: evidence invalid: {reason}")]
    EvidenceInvalid {
        /// Modality tag (`TYPE_A`..`TYPE_F`).
        modality: String,
        /// What failed validation.
        reason: String,
    },

    /// A required evidence key is absent.
    #[error("modality {modality}: missing required evidence key {key:?}")]
    MissingKey {
        /// Modality tag.
        modality: String,
        /// The absent key.
        key: String,
    },

    /// A modality configuration was rejected at load time.
    #[error("modality {modality}: invalid configuration: {reason}")]
    InvalidModalityConfig {
        /// Modality tag.
        modality: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Quality-level thresholds are not monotonically non-increasing.
    #[error("quality thresholds not monotone: {level_a}={value_a} < {level_b}={value_b}")]
    ThresholdsNotMonotone {
        /// Higher level name.
        level_a: &'static str,
        /// Its threshold.
        value_a: f64,
        /// Lower level name.
        level_b: &'static str,
        /// Its threshold.
        value_b: f64,
    },

    /// Evidence canonicalization failed.
    #[error("evidence canonicalization failed: {reason}")]
    CanonicalizationFailed {
        /// Reason for the failure.
        reason: String,
    },
}

/// Aggregation errors.
#[derive(Error, Debug)]
pub enum AggregationError {
    /// Coverage is incomplete for a rollup (strict mode).
    #[error("coverage error for {scope}: expected {expected} scores, found {found}")]
    Coverage {
        /// The (PA, DIM) or PA scope being rolled up.
        scope: String,
        /// Expected score count.
        expected: usize,
        /// Scores actually present.
        found: usize,
    },

    /// Weights do not sum to 1.0 within tolerance.
    #[error("weights for {scope} sum to {sum:.8}, expected 1.0 +/- {tolerance}")]
    WeightSum {
        /// Scope whose weights are invalid.
        scope: String,
        /// Actual sum.
        sum: f64,
        /// Permitted deviation.
        tolerance: f64,
    },

    /// Weight and score lists have different lengths.
    #[error("weights for {scope}: {weights} weights for {scores} scores")]
    WeightArity {
        /// Scope whose weights are invalid.
        scope: String,
        /// Number of weights.
        weights: usize,
        /// Number of scores.
        scores: usize,
    },
}

/// I/O-specific errors for file and artifact operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Columnar (Arrow IPC) read/write error.
    #[error("columnar artifact error: {path}: {reason}")]
    Columnar {
        /// Path to the artifact.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

// Implement From traits for standard library and ecosystem errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(IoError::Generic(format!("JSON error: {err}")))
    }
}

impl From<regex::Error> for SignalError {
    fn from(err: regex::Error) -> Self {
        Self::MonolithInvalid {
            reason: format!("regex error: {err}"),
        }
    }
}

impl Error {
    /// Returns `true` if the error represents a data-contract failure
    /// (the input violates a declared invariant) rather than a system
    /// failure. Data-contract failures are always fatal to the run.
    #[must_use]
    pub const fn is_data_contract(&self) -> bool {
        matches!(
            self,
            Self::Ingest(_)
                | Self::Matrix(_)
                | Self::Irrigation(_)
                | Self::Scoring(_)
                | Self::Aggregation(_)
                | Self::Config { .. }
        )
    }
}
