//! The irrigation synchronizer state machine.
//!
//! Per question: extraction validation, deterministic ordering, chunk
//! routing, strict-equality pattern filtering, signal resolution, schema
//! compatibility, task construction. Plan assembly concatenates the 300
//! tasks into the immutable execution plan.

use crate::error::{IrrigationError, Result};
use crate::irrigation::routing::{ChunkRoutingResult, route_question};
use crate::irrigation::schema_check::check_schema_compatibility;
use crate::irrigation::task::{ExecutableTask, ExecutionPlan, TaskMetadata};
use crate::matrix::ChunkMatrix;
use crate::scoring::Modality;
use crate::signal::pack::required_payload_fields;
use crate::signal::{QuestionSpec, ResolvedSignal, SignalRegistry};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Version string stamped into every task.
pub const SYNCHRONIZER_VERSION: &str = "2.0.0";

/// The synchronizer: borrows the chunk matrix and signal registry for
/// the duration of one irrigation run.
pub struct IrrigationSynchronizer<'a> {
    matrix: &'a ChunkMatrix,
    registry: &'a SignalRegistry,
    correlation_id: String,
}

impl<'a> IrrigationSynchronizer<'a> {
    /// Creates a synchronizer for one run.
    #[must_use]
    pub fn new(
        matrix: &'a ChunkMatrix,
        registry: &'a SignalRegistry,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            matrix,
            registry,
            correlation_id: correlation_id.into(),
        }
    }

    /// Runs the full state machine over the question list.
    ///
    /// # Errors
    ///
    /// Any phase failure aborts the run with a typed error naming the
    /// question (or task) and the reason.
    pub fn synchronize(&self, questions: &[QuestionSpec]) -> Result<ExecutionPlan> {
        // Phase 1: question extraction validation
        for question in questions {
            validate_question(question)?;
        }

        // Phase 2: deterministic iteration order
        let mut ordered: Vec<&QuestionSpec> = questions.iter().collect();
        ordered.sort_by_key(|q| q.question_global);
        debug!(count = ordered.len(), "irrigation order prepared");

        let mut tasks = Vec::with_capacity(ordered.len());
        for question in ordered {
            tasks.push(self.irrigate_one(question)?);
        }

        ExecutionPlan::new(tasks)
    }

    /// Phases 3-7 for one question.
    fn irrigate_one(&self, question: &QuestionSpec) -> Result<ExecutableTask> {
        // Phase 3: chunk routing
        let routing = route_question(question, self.matrix)?;

        // Phase 4: pattern filtering
        let applicable_patterns = filter_patterns(question, &routing)?;
        if applicable_patterns.is_empty() {
            // Zero applicable patterns is a warning, not an error
            warn!(
                question_global = question.question_global,
                chunk_id = %routing.chunk_id,
                "no patterns applicable after policy-area filtering"
            );
        }

        // Phase 5: signal resolution
        let resolved_signals = self.resolve_signals(question, &routing)?;

        // Phase 6: schema compatibility
        let question_schema = question
            .expected_elements
            .as_ref()
            .ok_or_else(|| IrrigationError::InvalidQuestion {
                question_id: question.question_global.to_string(),
                reason: "expected_elements absent at schema check".to_string(),
            })?;
        check_schema_compatibility(
            question.question_global,
            question_schema,
            &routing.expected_elements,
        )?;

        // Phase 7: task construction
        let base_slot = question
            .base_slot
            .parse()
            .map_err(|e| IrrigationError::InvalidQuestion {
                question_id: question.question_global.to_string(),
                reason: format!("bad base_slot: {e}"),
            })?;
        let modality: Modality =
            question
                .scoring_modality
                .parse()
                .map_err(|reason: String| IrrigationError::InvalidQuestion {
                    question_id: question.question_global.to_string(),
                    reason,
                })?;
        let policy_area = routing
            .policy_area_id
            .parse()
            .map_err(|e| IrrigationError::InvalidQuestion {
                question_id: question.question_global.to_string(),
                reason: format!("bad policy_area_id: {e}"),
            })?;
        let dimension = routing
            .dimension_id
            .parse()
            .map_err(|e| IrrigationError::InvalidQuestion {
                question_id: question.question_global.to_string(),
                reason: format!("bad dimension_id: {e}"),
            })?;

        let metadata = TaskMetadata {
            base_slot: base_slot_canonical(&question.base_slot),
            cluster_id: question.cluster_id.clone().unwrap_or_default(),
            document_position: routing.document_position,
            synchronizer_version: SYNCHRONIZER_VERSION.to_string(),
            correlation_id: self.correlation_id.clone(),
            original_pattern_count: question.patterns.len(),
            original_signal_count: question.required_signals.len(),
            filtered_pattern_count: applicable_patterns.len(),
            resolved_signal_count: resolved_signals.len(),
            schema_element_count: question_schema.len(),
        };

        ExecutableTask::new(
            format!("T{:03}", question.question_global),
            format!("{}:{}", metadata.base_slot, question.question_global),
            question.question_global,
            base_slot,
            policy_area,
            dimension,
            modality,
            routing.chunk_id.clone(),
            applicable_patterns,
            resolved_signals,
            SYNCHRONIZER_VERSION,
            metadata,
        )
    }

    /// Phase 5: resolve and validate the question's required signals.
    fn resolve_signals(
        &self,
        question: &QuestionSpec,
        routing: &ChunkRoutingResult,
    ) -> Result<Vec<ResolvedSignal>> {
        if question.required_signals.is_empty() {
            return Ok(Vec::new());
        }

        let pa = routing
            .policy_area_id
            .parse()
            .map_err(|e| IrrigationError::RoutingFailed {
                question_id: question.question_global,
                reason: format!("bad policy_area_id at signal resolution: {e}"),
            })?;
        let signals = self
            .registry
            .signals_for_chunk(&routing.target_chunk, pa, &question.required_signals)?;

        let mut seen = BTreeSet::new();
        for signal in signals.iter() {
            // Validate per-type required payload fields; a miss is a hard stop
            let payload = signal.payload.as_object();
            for field in required_payload_fields(&signal.signal_type) {
                let present = payload.is_some_and(|p| p.contains_key(*field));
                if !present {
                    return Err(IrrigationError::SignalUnresolved {
                        question_id: question.question_global,
                        signal_type: signal.signal_type.clone(),
                        reason: format!("payload missing required field {field:?}"),
                    }
                    .into());
                }
            }
            // Unknown signal types carry no known fields at all
            if required_payload_fields(&signal.signal_type).is_empty() {
                return Err(IrrigationError::SignalUnresolved {
                    question_id: question.question_global,
                    signal_type: signal.signal_type.clone(),
                    reason: "unknown signal type".to_string(),
                }
                .into());
            }
            if !seen.insert((signal.signal_type.clone(), signal.name.clone())) {
                warn!(
                    question_global = question.question_global,
                    signal_type = %signal.signal_type,
                    name = %signal.name,
                    "duplicate resolved signal"
                );
            }
        }

        Ok(signals.as_ref().clone())
    }
}

/// Phase 1 validation of one question.
fn validate_question(question: &QuestionSpec) -> Result<()> {
    let question_id = question.question_global.to_string();
    let fail = |reason: String| IrrigationError::InvalidQuestion {
        question_id: question_id.clone(),
        reason,
    };

    if question.question_global > 999 {
        return Err(fail(format!(
            "question_global {} outside [0, 999]",
            question.question_global
        ))
        .into());
    }
    if question.base_slot.trim().is_empty() {
        return Err(fail("missing base_slot".to_string()).into());
    }
    if question.policy_area_id.trim().is_empty() {
        return Err(fail("missing policy_area_id".to_string()).into());
    }
    if question.dimension_id.trim().is_empty() {
        return Err(fail("missing dimension_id".to_string()).into());
    }
    if question.expected_elements.is_none() {
        return Err(fail("missing expected_elements (list or dict)".to_string()).into());
    }
    Ok(())
}

/// Phase 4: strict-equality pattern filtering.
///
/// Non-dict entries and entries without a non-empty `policy_area_id` are
/// errors naming the question and pattern index. The kept patterns form
/// an immutable tuple preserving original order.
fn filter_patterns(question: &QuestionSpec, routing: &ChunkRoutingResult) -> Result<Vec<Value>> {
    if routing.policy_area_id.is_empty() {
        return Err(IrrigationError::RoutingFailed {
            question_id: question.question_global,
            reason: "empty target policy area at pattern filtering".to_string(),
        }
        .into());
    }

    let mut kept = Vec::new();
    for (pattern_index, pattern) in question.patterns.iter().enumerate() {
        let map = pattern
            .as_object()
            .ok_or_else(|| IrrigationError::InvalidPattern {
                question_id: question.question_global,
                pattern_index,
                reason: "pattern entry is not a dict".to_string(),
            })?;
        let pattern_pa = map
            .get("policy_area_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IrrigationError::InvalidPattern {
                question_id: question.question_global,
                pattern_index,
                reason: "missing policy_area_id".to_string(),
            })?;
        if pattern_pa == routing.policy_area_id {
            kept.push(pattern.clone());
        }
    }
    Ok(kept)
}

/// Canonicalizes a base slot string (`D1Q1` and `D1-Q1` both -> `D1-Q1`).
fn base_slot_canonical(raw: &str) -> String {
    raw.parse::<crate::ids::BaseSlot>()
        .map_or_else(|_| raw.to_string(), |slot| slot.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalConfig;
    use crate::graph::{Chunk, Resolution, TextSpan};
    use crate::ids::{Dimension, PolicyArea, chunk_id};
    use crate::schema::{SchemaSpec, dimension_default_schema};
    use crate::signal::MonolithProvider;
    use crate::signal::monolith::{MonolithBlocks, MonolithIntegrity, QuestionMonolith};
    use serde_json::json;
    use std::sync::Arc;

    fn full_matrix() -> ChunkMatrix {
        let mut chunks = Vec::new();
        for pa in 1..=10u8 {
            for dim in 1..=6u8 {
                let pa = PolicyArea::new(pa).unwrap();
                let dim = Dimension::new(dim).unwrap();
                let mut chunk = Chunk::new(
                    chunk_id(pa, dim),
                    format!("contenido {pa} {dim}"),
                    Resolution::Meso,
                    TextSpan::new(0, 20),
                );
                chunk.policy_area_id = Some(pa.to_string());
                chunk.dimension_id = Some(dim.to_string());
                chunk.expected_elements = Some(dimension_default_schema(dim));
                chunks.push(chunk);
            }
        }
        ChunkMatrix::build(chunks).unwrap()
    }

    /// A compatible question schema: same element types, nothing required.
    fn question_schema(dim: Dimension) -> SchemaSpec {
        match dimension_default_schema(dim) {
            SchemaSpec::List(items) => SchemaSpec::List(
                items
                    .into_iter()
                    .map(|mut e| {
                        e.required = false;
                        e.minimum = None;
                        e
                    })
                    .collect(),
            ),
            SchemaSpec::Map(items) => SchemaSpec::Map(items),
        }
    }

    pub(crate) fn question(
        question_global: u32,
        pa: u8,
        dim: u8,
        q: u8,
        patterns: Vec<Value>,
    ) -> QuestionSpec {
        QuestionSpec {
            question_global,
            base_slot: format!("D{dim}-Q{q}"),
            policy_area_id: format!("PA{pa:02}"),
            dimension_id: format!("D{dim}"),
            cluster_id: Some(format!("CL{dim:02}")),
            patterns,
            expected_elements: Some(question_schema(Dimension::new(dim).unwrap())),
            validations: None,
            scoring_modality: "TYPE_A".to_string(),
            required_signals: vec!["patterns".to_string()],
        }
    }

    /// The 300-question instrument: question i covers PA ((i-1)%10)+1,
    /// dimension ((i-1)/50)+1, slot question (((i-1)/10)%5)+1.
    fn all_questions() -> Vec<QuestionSpec> {
        (1..=300u32)
            .map(|i| {
                let dim = u8::try_from((i - 1) / 50 + 1).unwrap();
                let q = u8::try_from(((i - 1) / 10) % 5 + 1).unwrap();
                let pa = u8::try_from((i - 1) % 10 + 1).unwrap();
                let pa_tag = format!("PA{pa:02}");
                question(
                    i,
                    pa,
                    dim,
                    q,
                    vec![
                        json!({"policy_area_id": pa_tag, "text": "presupuesto"}),
                        json!({"policy_area_id": "PA99", "text": "otro"}),
                    ],
                )
            })
            .collect()
    }

    fn registry_for(questions: &[QuestionSpec]) -> SignalRegistry {
        let monolith = QuestionMonolith {
            schema_version: "2.0.0".to_string(),
            schema: None,
            integrity: MonolithIntegrity::default(),
            canonical_notation: None,
            blocks: MonolithBlocks::default(),
            questions: questions.to_vec(),
        };
        let provider =
            Arc::new(MonolithProvider::from_monolith(monolith, "inline".to_string()).unwrap());
        SignalRegistry::new(provider, &SignalConfig::default())
    }

    #[test]
    fn test_full_irrigation_yields_300_tasks() {
        let matrix = full_matrix();
        let questions = all_questions();
        let registry = registry_for(&questions);
        let synchronizer = IrrigationSynchronizer::new(&matrix, &registry, "corr-1");
        let plan = synchronizer.synchronize(&questions).unwrap();
        assert_eq!(plan.len(), 300);

        let ids: BTreeSet<&str> = plan.tasks().iter().map(ExecutableTask::task_id).collect();
        assert_eq!(ids.len(), 300);

        // Ordered by question_global
        let globals: Vec<u32> = plan.tasks().iter().map(ExecutableTask::question_global).collect();
        let mut sorted = globals.clone();
        sorted.sort_unstable();
        assert_eq!(globals, sorted);
    }

    #[test]
    fn test_pattern_filtering_strict_equality() {
        let matrix = full_matrix();
        let questions = vec![question(
            1,
            1,
            1,
            1,
            vec![
                json!({"policy_area_id": "PA01", "text": "presupuesto"}),
                json!({"policy_area_id": "PA02", "text": "otro"}),
            ],
        )];
        let registry = registry_for(&questions);
        let synchronizer = IrrigationSynchronizer::new(&matrix, &registry, "corr-1");
        let task = synchronizer.irrigate_one(&questions[0]).unwrap();
        assert_eq!(task.applicable_patterns().len(), 1);
        assert_eq!(task.synchronizer_version(), "2.0.0");
        assert_eq!(task.metadata().filtered_pattern_count, 1);
        assert_eq!(task.metadata().original_pattern_count, 2);
    }

    #[test]
    fn test_pattern_missing_policy_area_cites_index() {
        let matrix = full_matrix();
        let questions = vec![question(1, 1, 1, 1, vec![json!({"pattern": "x"})])];
        let registry = registry_for(&questions);
        let synchronizer = IrrigationSynchronizer::new(&matrix, &registry, "corr-1");
        let err = synchronizer.irrigate_one(&questions[0]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("question 1"));
        assert!(msg.contains("pattern 0"));
        assert!(msg.contains("missing policy_area_id"));
    }

    #[test]
    fn test_non_dict_pattern_rejected() {
        let matrix = full_matrix();
        let questions = vec![question(1, 1, 1, 1, vec![json!("bare string")])];
        let registry = registry_for(&questions);
        let synchronizer = IrrigationSynchronizer::new(&matrix, &registry, "corr-1");
        let err = synchronizer.irrigate_one(&questions[0]).unwrap_err();
        assert!(err.to_string().contains("not a dict"));
    }

    #[test]
    fn test_zero_filtered_patterns_is_warning_not_error() {
        let matrix = full_matrix();
        let questions = vec![question(
            1,
            1,
            1,
            1,
            vec![json!({"policy_area_id": "PA02", "text": "otro"})],
        )];
        let registry = registry_for(&questions);
        let synchronizer = IrrigationSynchronizer::new(&matrix, &registry, "corr-1");
        let task = synchronizer.irrigate_one(&questions[0]).unwrap();
        assert_eq!(task.metadata().filtered_pattern_count, 0);
    }

    #[test]
    fn test_unknown_signal_type_hard_stop() {
        let matrix = full_matrix();
        let mut q = question(1, 1, 1, 1, vec![json!({"policy_area_id": "PA01"})]);
        q.required_signals = vec!["bayesian_prior".to_string()];
        let questions = vec![q];
        let registry = registry_for(&questions);
        let synchronizer = IrrigationSynchronizer::new(&matrix, &registry, "corr-1");
        let err = synchronizer.irrigate_one(&questions[0]).unwrap_err();
        assert!(err.to_string().contains("bayesian_prior"));
    }

    #[test]
    fn test_incompatible_schema_aborts() {
        let matrix = full_matrix();
        let mut q = question(1, 1, 1, 1, vec![json!({"policy_area_id": "PA01"})]);
        // Demand a minimum above what cell chunks provide (1.0)
        q.expected_elements = Some(SchemaSpec::List(vec![crate::schema::ElementSpec {
            element_type: "baseline".to_string(),
            required: false,
            minimum: Some(5.0),
        }]));
        let questions = vec![q];
        let registry = registry_for(&questions);
        let synchronizer = IrrigationSynchronizer::new(&matrix, &registry, "corr-1");
        let err = synchronizer.irrigate_one(&questions[0]).unwrap_err();
        assert!(err.to_string().contains("schema incompatible") || err.to_string().contains("length mismatch"));
    }

    #[test]
    fn test_question_validation_out_of_range() {
        let mut q = question(1, 1, 1, 1, vec![]);
        q.question_global = 1000;
        let err = validate_question(&q).unwrap_err();
        assert!(err.to_string().contains("outside [0, 999]"));
    }

    #[test]
    fn test_question_validation_missing_fields() {
        let mut q = question(1, 1, 1, 1, vec![]);
        q.expected_elements = None;
        assert!(validate_question(&q).is_err());

        let mut q = question(1, 1, 1, 1, vec![]);
        q.base_slot = "  ".to_string();
        assert!(validate_question(&q).is_err());
    }

    #[test]
    fn test_metadata_envelope_complete() {
        let matrix = full_matrix();
        let questions = vec![question(
            42,
            2,
            1,
            3,
            vec![json!({"policy_area_id": "PA02", "text": "meta"})],
        )];
        let registry = registry_for(&questions);
        let synchronizer = IrrigationSynchronizer::new(&matrix, &registry, "corr-42");
        let task = synchronizer.irrigate_one(&questions[0]).unwrap();
        let metadata = task.metadata();
        assert_eq!(metadata.base_slot, "D1-Q3");
        assert_eq!(metadata.cluster_id, "CL01");
        assert_eq!(metadata.correlation_id, "corr-42");
        assert_eq!(metadata.synchronizer_version, "2.0.0");
        assert_eq!(metadata.original_signal_count, 1);
        assert_eq!(metadata.resolved_signal_count, 1);
        assert_eq!(metadata.schema_element_count, 3);
        assert!(metadata.document_position.is_some());
    }
}
