//! Executable tasks and the execution plan.
//!
//! Tasks are frozen at construction: every field is private, patterns and
//! signals are stored as shared immutable slices, and no setter exists.
//! The plan holds exactly 300 tasks with unique ids and a cryptographic
//! integrity hash over its canonical shape.

use crate::error::{IrrigationError, Result};
use crate::ids::{BaseSlot, Dimension, PolicyArea, QUESTION_COUNT};
use crate::scoring::Modality;
use crate::scoring::canonical::{canonical_json, sha256_hex};
use crate::signal::ResolvedSignal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// The metadata envelope carried by every task: exactly these ten keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Executor base slot, canonical form.
    pub base_slot: String,
    /// Cluster the question belongs to.
    pub cluster_id: String,
    /// Byte span of the routed chunk, when known.
    pub document_position: Option<(u64, u64)>,
    /// Synchronizer version that built the task.
    pub synchronizer_version: String,
    /// Run correlation id.
    pub correlation_id: String,
    /// Pattern count before filtering.
    pub original_pattern_count: usize,
    /// Declared signal requirement count.
    pub original_signal_count: usize,
    /// Pattern count after strict-equality filtering.
    pub filtered_pattern_count: usize,
    /// Signals actually resolved.
    pub resolved_signal_count: usize,
    /// Element count of the question schema.
    pub schema_element_count: usize,
}

/// One executable task: the irrigation output for a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableTask {
    task_id: String,
    question_context: String,
    question_global: u32,
    base_slot: BaseSlot,
    policy_area: PolicyArea,
    dimension: Dimension,
    modality: Modality,
    target_chunk_id: String,
    applicable_patterns: Box<[Value]>,
    resolved_signals: Box<[ResolvedSignal]>,
    created_at: DateTime<Utc>,
    synchronizer_version: String,
    metadata: TaskMetadata,
}

impl ExecutableTask {
    /// Constructs a frozen task.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigationError::EmptyTaskField`] when a routing field
    /// arrives empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: String,
        question_context: String,
        question_global: u32,
        base_slot: BaseSlot,
        policy_area: PolicyArea,
        dimension: Dimension,
        modality: Modality,
        target_chunk_id: String,
        applicable_patterns: Vec<Value>,
        resolved_signals: Vec<ResolvedSignal>,
        synchronizer_version: &str,
        metadata: TaskMetadata,
    ) -> Result<Self> {
        if task_id.is_empty() {
            return Err(IrrigationError::EmptyTaskField {
                task_id: "<unset>".to_string(),
                field: "task_id",
            }
            .into());
        }
        if target_chunk_id.is_empty() {
            return Err(IrrigationError::EmptyTaskField {
                task_id,
                field: "target_chunk_id",
            }
            .into());
        }
        if question_context.is_empty() {
            return Err(IrrigationError::EmptyTaskField {
                task_id,
                field: "question_context",
            }
            .into());
        }
        Ok(Self {
            task_id,
            question_context,
            question_global,
            base_slot,
            policy_area,
            dimension,
            modality,
            target_chunk_id,
            applicable_patterns: applicable_patterns.into(),
            resolved_signals: resolved_signals.into(),
            created_at: Utc::now(),
            synchronizer_version: synchronizer_version.to_string(),
            metadata,
        })
    }

    /// Stable task id.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Micro-question context identifier.
    #[must_use]
    pub fn question_context(&self) -> &str {
        &self.question_context
    }

    /// Global question id.
    #[must_use]
    pub const fn question_global(&self) -> u32 {
        self.question_global
    }

    /// Executor base slot.
    #[must_use]
    pub const fn base_slot(&self) -> BaseSlot {
        self.base_slot
    }

    /// Policy area of the question.
    #[must_use]
    pub const fn policy_area(&self) -> PolicyArea {
        self.policy_area
    }

    /// Dimension of the question.
    #[must_use]
    pub const fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Scoring modality of the question.
    #[must_use]
    pub const fn modality(&self) -> Modality {
        self.modality
    }

    /// Target chunk id.
    #[must_use]
    pub fn target_chunk_id(&self) -> &str {
        &self.target_chunk_id
    }

    /// The filtered applicable patterns (immutable).
    #[must_use]
    pub fn applicable_patterns(&self) -> &[Value] {
        &self.applicable_patterns
    }

    /// The resolved required signals (immutable).
    #[must_use]
    pub fn resolved_signals(&self) -> &[ResolvedSignal] {
        &self.resolved_signals
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Synchronizer version that built the task.
    #[must_use]
    pub fn synchronizer_version(&self) -> &str {
        &self.synchronizer_version
    }

    /// The ten-key metadata envelope.
    #[must_use]
    pub const fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }
}

/// The ordered, immutable collection of exactly 300 tasks.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    tasks: Box<[ExecutableTask]>,
    integrity_hash: String,
}

impl ExecutionPlan {
    /// Assembles a plan from tasks.
    ///
    /// # Errors
    ///
    /// Rejects duplicate task ids and any size other than 300.
    pub fn new(tasks: Vec<ExecutableTask>) -> Result<Self> {
        if tasks.len() != QUESTION_COUNT {
            return Err(IrrigationError::PlanCardinality {
                found: tasks.len(),
                expected: QUESTION_COUNT,
            }
            .into());
        }
        let mut seen = BTreeSet::new();
        for task in &tasks {
            if !seen.insert(task.task_id().to_string()) {
                return Err(IrrigationError::DuplicateTask {
                    task_id: task.task_id().to_string(),
                }
                .into());
            }
        }

        let integrity_hash = plan_hash(&tasks)?;
        Ok(Self {
            tasks: tasks.into_boxed_slice(),
            integrity_hash,
        })
    }

    /// Tasks in question order.
    #[must_use]
    pub fn tasks(&self) -> &[ExecutableTask] {
        &self.tasks
    }

    /// Number of tasks (always 300).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// A plan is never empty; provided for completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// SHA-256 over the plan's canonical shape.
    #[must_use]
    pub fn integrity_hash(&self) -> &str {
        &self.integrity_hash
    }
}

/// Hashes the canonical shape of the plan: per-task identity triples in
/// order, excluding timestamps so re-irrigation of identical inputs
/// yields the same hash.
fn plan_hash(tasks: &[ExecutableTask]) -> Result<String> {
    let shape: Vec<Value> = tasks
        .iter()
        .map(|t| {
            serde_json::json!({
                "task_id": t.task_id(),
                "question_global": t.question_global(),
                "chunk_id": t.target_chunk_id(),
                "filtered_pattern_count": t.metadata().filtered_pattern_count,
                "resolved_signal_count": t.metadata().resolved_signal_count,
            })
        })
        .collect();
    Ok(sha256_hex(&canonical_json(&Value::Array(shape))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_metadata(slot: &str) -> TaskMetadata {
        TaskMetadata {
            base_slot: slot.to_string(),
            cluster_id: "CL01".to_string(),
            document_position: Some((0, 20)),
            synchronizer_version: "2.0.0".to_string(),
            correlation_id: "corr-1".to_string(),
            original_pattern_count: 2,
            original_signal_count: 1,
            filtered_pattern_count: 1,
            resolved_signal_count: 1,
            schema_element_count: 0,
        }
    }

    fn sample_task(question_global: u32) -> ExecutableTask {
        let dim = u8::try_from(((question_global - 1) / 50) + 1).unwrap();
        let q = u8::try_from((((question_global - 1) / 10) % 5) + 1).unwrap();
        let pa = u8::try_from(((question_global - 1) % 10) + 1).unwrap();
        let slot = BaseSlot::new(dim, q).unwrap();
        ExecutableTask::new(
            format!("T{question_global:03}"),
            format!("{slot}:{question_global}"),
            question_global,
            slot,
            PolicyArea::new(pa).unwrap(),
            Dimension::new(dim).unwrap(),
            Modality::TypeA,
            format!("PA{pa:02}-DIM{dim:02}"),
            vec![serde_json::json!({"policy_area_id": format!("PA{pa:02}")})],
            vec![],
            "2.0.0",
            sample_metadata(&slot.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_task_is_frozen_shape() {
        let task = sample_task(1);
        assert_eq!(task.task_id(), "T001");
        assert_eq!(task.synchronizer_version(), "2.0.0");
        assert_eq!(task.applicable_patterns().len(), 1);
        assert_eq!(task.metadata().filtered_pattern_count, 1);
    }

    #[test]
    fn test_metadata_has_exactly_ten_keys() {
        let metadata = sample_metadata("D1-Q1");
        let value = serde_json::to_value(&metadata).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 10);
        for expected in [
            "base_slot",
            "cluster_id",
            "document_position",
            "synchronizer_version",
            "correlation_id",
            "original_pattern_count",
            "original_signal_count",
            "filtered_pattern_count",
            "resolved_signal_count",
            "schema_element_count",
        ] {
            assert!(keys.iter().any(|k| k.as_str() == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_empty_chunk_id_rejected() {
        let result = ExecutableTask::new(
            "T001".to_string(),
            "D1-Q1:1".to_string(),
            1,
            BaseSlot::new(1, 1).unwrap(),
            PolicyArea::new(1).unwrap(),
            Dimension::new(1).unwrap(),
            Modality::TypeA,
            String::new(),
            vec![],
            vec![],
            "2.0.0",
            sample_metadata("D1-Q1"),
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("T001"));
        assert!(err.to_string().contains("target_chunk_id"));
    }

    #[test]
    fn test_plan_requires_exactly_300() {
        let tasks: Vec<ExecutableTask> = (1..=299).map(sample_task).collect();
        let err = ExecutionPlan::new(tasks).unwrap_err();
        assert!(err.to_string().contains("299"));
    }

    #[test]
    fn test_plan_accepts_300_unique() {
        let tasks: Vec<ExecutableTask> = (1..=300).map(sample_task).collect();
        let plan = ExecutionPlan::new(tasks).unwrap();
        assert_eq!(plan.len(), 300);
        assert!(!plan.integrity_hash().is_empty());
    }

    #[test]
    fn test_plan_rejects_duplicates() {
        let mut tasks: Vec<ExecutableTask> = (1..=300).map(sample_task).collect();
        tasks[1] = tasks[0].clone();
        let err = ExecutionPlan::new(tasks).unwrap_err();
        assert!(err.to_string().contains("duplicate task id"));
    }

    #[test]
    fn test_plan_hash_deterministic() {
        let a = ExecutionPlan::new((1..=300).map(sample_task).collect()).unwrap();
        let b = ExecutionPlan::new((1..=300).map(sample_task).collect()).unwrap();
        assert_eq!(a.integrity_hash(), b.integrity_hash());
    }

    #[test]
    fn test_plan_hash_sensitive_to_routing() {
        let a = ExecutionPlan::new((1..=300).map(sample_task).collect()).unwrap();
        let mut tasks: Vec<ExecutableTask> = (1..=300).map(sample_task).collect();
        let replacement = ExecutableTask::new(
            "T001-alt".to_string(),
            tasks[0].question_context().to_string(),
            1,
            tasks[0].base_slot(),
            tasks[0].policy_area(),
            tasks[0].dimension(),
            Modality::TypeA,
            tasks[0].target_chunk_id().to_string(),
            vec![],
            vec![],
            "2.0.0",
            sample_metadata("D1-Q1"),
        )
        .unwrap();
        tasks[0] = replacement;
        let b = ExecutionPlan::new(tasks).unwrap();
        assert_ne!(a.integrity_hash(), b.integrity_hash());
    }
}
