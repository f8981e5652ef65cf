//! Schema compatibility (synchronizer Phase 6).
//!
//! Validates the question schema against the routed chunk schema under
//! two semantic rules:
//!
//! - **Asymmetric required-field implication**: `q_required` implies
//!   `c_required`. The converse is not checked; a chunk may require more
//!   than the question asks for.
//! - **Minimum-threshold ordering**: the chunk's `minimum` must be at
//!   least the question's.
//!
//! Both schemas must be the same kind: lists of the same length with
//! matching element-type sequences, or maps with equal key sets.

use crate::error::{IrrigationError, Result};
use crate::schema::{ElementSpec, SchemaSpec};

/// Checks question-schema / chunk-schema compatibility.
///
/// # Errors
///
/// Returns [`IrrigationError::SchemaIncompatible`] identifying the
/// question and the offending element index.
pub fn check_schema_compatibility(
    question_id: u32,
    question_schema: &SchemaSpec,
    chunk_schema: &SchemaSpec,
) -> Result<()> {
    let fail = |element_index: usize, reason: String| IrrigationError::SchemaIncompatible {
        question_id,
        element_index,
        reason,
    };

    match (question_schema, chunk_schema) {
        (SchemaSpec::List(q_items), SchemaSpec::List(c_items)) => {
            if q_items.len() != c_items.len() {
                return Err(fail(
                    0,
                    format!(
                        "length mismatch: question has {}, chunk has {}",
                        q_items.len(),
                        c_items.len()
                    ),
                )
                .into());
            }
            for (index, (q, c)) in q_items.iter().zip(c_items.iter()).enumerate() {
                if q.element_type != c.element_type {
                    return Err(fail(
                        index,
                        format!(
                            "element type mismatch: question {:?}, chunk {:?}",
                            q.element_type, c.element_type
                        ),
                    )
                    .into());
                }
                check_element(question_id, index, q, c)?;
            }
            Ok(())
        }
        (SchemaSpec::Map(q_items), SchemaSpec::Map(c_items)) => {
            let q_keys: Vec<&String> = q_items.keys().collect();
            let c_keys: Vec<&String> = c_items.keys().collect();
            if q_keys != c_keys {
                return Err(fail(
                    0,
                    format!("key set mismatch: question {q_keys:?}, chunk {c_keys:?}"),
                )
                .into());
            }
            for (index, (key, q)) in q_items.iter().enumerate() {
                if let Some(c) = c_items.get(key) {
                    check_element(question_id, index, q, c)?;
                }
            }
            Ok(())
        }
        _ => Err(fail(0, "schema kind mismatch: one is a list, the other a map".to_string()).into()),
    }
}

/// Per-element rules: asymmetric implication and minimum ordering.
fn check_element(question_id: u32, index: usize, q: &ElementSpec, c: &ElementSpec) -> Result<()> {
    if q.required && !c.required {
        return Err(IrrigationError::SchemaIncompatible {
            question_id,
            element_index: index,
            reason: format!(
                "required implication violated for {:?}: question requires, chunk does not",
                q.element_type
            ),
        }
        .into());
    }
    if let Some(q_min) = q.minimum {
        // A chunk that declares no minimum provides zero
        let c_min = c.minimum.unwrap_or(0.0);
        if c_min < q_min {
            return Err(IrrigationError::SchemaIncompatible {
                question_id,
                element_index: index,
                reason: format!(
                    "minimum ordering violated for {:?}: chunk {c_min} < question {q_min}",
                    q.element_type
                ),
            }
            .into());
        }
    }
    Ok(())
}
