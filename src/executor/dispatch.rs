//! Executor dispatch: runs a task's method sequence over its chunk.
//!
//! Tasks execute sequentially within a document run. For each invocation
//! the dispatcher resolves the declared parameter aliases against the
//! argument context, applies the memory caps for the method's executor
//! class, invokes, and records the outcome. A method failing on
//! correctly-resolved arguments is fatal to the task unless its sequence
//! entry declares a fallback.

use crate::config::ExecutorMemoryCaps;
use crate::error::{ExecutorError, Result};
use crate::executor::context::ArgumentContext;
use crate::executor::memory::{MemoryClass, apply_caps};
use crate::executor::methods::method_entry;
use crate::executor::sequences::{MethodRef, sequence_for};
use crate::graph::Chunk;
use crate::irrigation::ExecutableTask;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Record of one method invocation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InvocationRecord {
    /// Class name invoked.
    pub class: String,
    /// Method name invoked.
    pub method: String,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Whether the declared fallback produced the result.
    pub used_fallback: bool,
    /// Truncation metrics applied before the call.
    pub truncations: Vec<String>,
    /// Failure reason, when the invocation failed.
    pub error: Option<String>,
}

/// The execution log of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutionLog {
    /// Invocation records in sequence order.
    pub records: Vec<InvocationRecord>,
}

impl ExecutionLog {
    /// Number of failed invocations (including recovered-by-fallback).
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.records.iter().filter(|r| !r.success).count()
    }

    /// All truncation metrics across the run.
    #[must_use]
    pub fn truncations(&self) -> Vec<&str> {
        self.records
            .iter()
            .flat_map(|r| r.truncations.iter().map(String::as_str))
            .collect()
    }
}

/// Executes a task's method sequence against its routed chunk.
///
/// Returns the raw evidence dict for the modality scorer plus the
/// execution log.
///
/// # Errors
///
/// Returns an error for unknown methods, unresolved arguments, and
/// unrecovered method failures.
pub fn execute_task(
    task: &ExecutableTask,
    chunk: &Chunk,
    caps: &ExecutorMemoryCaps,
) -> Result<(Value, ExecutionLog)> {
    let data = json!({
        "patterns": task.applicable_patterns(),
        "signals": task.resolved_signals(),
        "policy_area_id": task.policy_area().to_string(),
        "dimension_id": task.dimension().to_string(),
    });
    let mut context = ArgumentContext::for_chunk(chunk, data);
    let mut evidence = Map::new();
    let mut log = ExecutionLog::default();

    for method_ref in sequence_for(task.base_slot())? {
        let outcome = invoke(task, &method_ref, &mut context, caps)?;
        merge_evidence(&mut evidence, &outcome.fragment);
        context.outputs.insert(
            format!("{}::{}", method_ref.class, method_ref.method),
            outcome.fragment,
        );
        log.records.push(outcome.record);
    }

    debug!(
        task_id = task.task_id(),
        invocations = log.records.len(),
        failures = log.failure_count(),
        "task executed"
    );
    Ok((Value::Object(evidence), log))
}

struct InvocationOutcome {
    fragment: Value,
    record: InvocationRecord,
}

/// Invokes one sequence entry, trying the declared fallback on failure.
fn invoke(
    task: &ExecutableTask,
    method_ref: &MethodRef,
    context: &mut ArgumentContext,
    caps: &ExecutorMemoryCaps,
) -> Result<InvocationOutcome> {
    let (function, params) =
        method_entry(method_ref.class, method_ref.method).ok_or_else(|| {
            ExecutorError::UnknownMethod {
                class: method_ref.class.to_string(),
                method: method_ref.method.to_string(),
            }
        })?;

    // Argument resolution: every declared slot must be populated
    for param in params {
        if !context.is_populated(*param) {
            return Err(ExecutorError::UnresolvedArgument {
                task_id: task.task_id().to_string(),
                alias: format!("{param:?}"),
                class: method_ref.class.to_string(),
                method: method_ref.method.to_string(),
            }
            .into());
        }
    }

    // Memory safety before the call
    let cap = MemoryClass::for_class(method_ref.class).cap(caps);
    let truncations = apply_caps(context, params, cap);

    match function(context) {
        Ok(fragment) => Ok(InvocationOutcome {
            fragment,
            record: InvocationRecord {
                class: method_ref.class.to_string(),
                method: method_ref.method.to_string(),
                success: true,
                used_fallback: false,
                truncations,
                error: None,
            },
        }),
        Err(reason) => {
            if let Some((fb_class, fb_method)) = method_ref.fallback {
                let (fb_fn, _) = method_entry(fb_class, fb_method).ok_or_else(|| {
                    ExecutorError::UnknownMethod {
                        class: fb_class.to_string(),
                        method: fb_method.to_string(),
                    }
                })?;
                if let Ok(fragment) = fb_fn(context) {
                    return Ok(InvocationOutcome {
                        fragment,
                        record: InvocationRecord {
                            class: method_ref.class.to_string(),
                            method: method_ref.method.to_string(),
                            success: false,
                            used_fallback: true,
                            truncations,
                            error: Some(reason),
                        },
                    });
                }
            }
            Err(ExecutorError::MethodFailed {
                task_id: task.task_id().to_string(),
                class: method_ref.class.to_string(),
                method: method_ref.method.to_string(),
                reason,
            }
            .into())
        }
    }
}

/// Merges a method's output fragment into the evidence dict.
///
/// `elements` arrays accumulate across methods; every other key is
/// last-writer-wins, which lets the dimension focus methods refine the
/// battery's earlier values.
fn merge_evidence(evidence: &mut Map<String, Value>, fragment: &Value) {
    let Some(fragment) = fragment.as_object() else {
        return;
    };
    for (key, value) in fragment {
        if key == "elements" {
            let existing = evidence
                .entry("elements")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let (Some(target), Some(incoming)) = (existing.as_array_mut(), value.as_array()) {
                target.extend(incoming.iter().cloned());
            }
        } else {
            evidence.insert(key.clone(), value.clone());
        }
    }
}
