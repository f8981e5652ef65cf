//! Chunk routing (synchronizer Phase 3).
//!
//! For each question: extract its policy area and dimension, normalize
//! the dimension form, and perform a strict-equality lookup in the chunk
//! matrix. Any missing field, missing chunk, or verification mismatch is
//! a single typed error naming the question and the reason.

use crate::error::{IrrigationError, Result};
use crate::graph::Chunk;
use crate::ids::{Dimension, PolicyArea};
use crate::matrix::ChunkMatrix;
use crate::schema::SchemaSpec;
use crate::signal::QuestionSpec;

/// The routing result for one question: the seven fields the downstream
/// phases consume.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRoutingResult {
    /// The full routed chunk.
    pub target_chunk: Chunk,
    /// The chunk id (`PA{nn}-DIM{nn}`).
    pub chunk_id: String,
    /// Canonical policy area id.
    pub policy_area_id: String,
    /// Canonical dimension id.
    pub dimension_id: String,
    /// Chunk text; guaranteed non-empty.
    pub text_content: String,
    /// Chunk schema; always a schema, never absent (empty list when the
    /// chunk declares none).
    pub expected_elements: SchemaSpec,
    /// Byte span of the chunk in the content stream, when known.
    pub document_position: Option<(u64, u64)>,
}

/// Routes a question to its matrix cell.
///
/// # Errors
///
/// Returns [`IrrigationError::RoutingFailed`] identifying the question
/// and the failure reason.
pub fn route_question(
    question: &QuestionSpec,
    matrix: &ChunkMatrix,
) -> Result<ChunkRoutingResult> {
    let question_id = question.question_global;
    let fail = |reason: String| IrrigationError::RoutingFailed {
        question_id,
        reason,
    };

    if question.policy_area_id.is_empty() {
        return Err(fail("missing policy_area_id".to_string()).into());
    }
    if question.dimension_id.is_empty() {
        return Err(fail("missing dimension_id".to_string()).into());
    }

    let pa: PolicyArea = question
        .policy_area_id
        .parse()
        .map_err(|e| fail(format!("bad policy_area_id: {e}")))?;
    // D1..D6 and DIM01..DIM06 both normalize here
    let dim: Dimension = question
        .dimension_id
        .parse()
        .map_err(|e| fail(format!("bad dimension_id: {e}")))?;

    let chunk = matrix
        .get(pa, dim)
        .ok_or_else(|| fail(format!("no chunk for cell {pa}-{dim}")))?;

    // Verification: the routed chunk must declare the same identity
    let chunk_pa = chunk.policy_area_id.as_deref().unwrap_or_default();
    let chunk_dim = chunk.dimension_id.as_deref().unwrap_or_default();
    if chunk_pa != pa.to_string() || chunk_dim != dim.to_string() {
        return Err(fail(format!(
            "verification mismatch: chunk declares ({chunk_pa}, {chunk_dim}), expected ({pa}, {dim})"
        ))
        .into());
    }

    if chunk.text.is_empty() {
        return Err(fail(format!("chunk {} has empty text", chunk.id)).into());
    }

    Ok(ChunkRoutingResult {
        chunk_id: chunk.id.clone(),
        policy_area_id: pa.to_string(),
        dimension_id: dim.to_string(),
        text_content: chunk.text.clone(),
        expected_elements: chunk.expected_elements.clone().unwrap_or_default(),
        document_position: Some((chunk.span.byte_start, chunk.span.byte_end)),
        target_chunk: chunk.clone(),
    })
}
