//! Chunk matrix builder.
//!
//! Assembles the 60-cell (policy area, dimension) matrix from ingestion
//! output. Every leaf validation raises a single typed error naming the
//! offending chunk index and its identity; violations are batch-collected
//! (up to ten rendered, the remainder counted) before aborting. A
//! contract-validation mode returns the report instead of raising, for
//! read-only diagnostics.

use crate::cpp::CanonPolicyPackage;
use crate::error::{MatrixError, Result};
use crate::graph::Chunk;
use crate::ids::{Dimension, MATRIX_CELL_COUNT, MatrixKey, PolicyArea, parse_chunk_id};
use serde::Serialize;
use std::collections::BTreeMap;

/// Maximum violations rendered in a batch error.
const MAX_RENDERED: usize = 10;

/// The immutable (policy area, dimension) to chunk mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMatrix {
    cells: BTreeMap<MatrixKey, Chunk>,
}

/// Read-only contract report produced by the diagnostics mode.
#[derive(Debug, Clone, Serialize)]
pub struct ContractReport {
    /// Number of candidate chunks checked.
    pub checked: usize,
    /// Whether the contract holds.
    pub valid: bool,
    /// Total violations found.
    pub violation_count: usize,
    /// Rendered violation messages (up to ten).
    pub violations: Vec<String>,
}

impl ChunkMatrix {
    /// Builds and validates the matrix from candidate cell chunks.
    ///
    /// # Errors
    ///
    /// Returns a single [`MatrixError`] for one violation, or
    /// [`MatrixError::Batch`] when several were collected.
    pub fn build(chunks: Vec<Chunk>) -> Result<Self> {
        let violations = contract_violations(&chunks);
        if !violations.is_empty() {
            return Err(batch(violations).into());
        }

        let mut cells = BTreeMap::new();
        for chunk in chunks {
            // Contract already validated: ids parse and are unique.
            if let Ok(key) = parse_chunk_id(&chunk.id) {
                cells.insert(key, chunk);
            }
        }
        Ok(Self { cells })
    }

    /// Extracts matrix cell candidates from a CPP and builds the matrix.
    ///
    /// Cell candidates are the graph chunks carrying both a
    /// `policy_area_id` and a `dimension_id`.
    ///
    /// # Errors
    ///
    /// Propagates contract violations from [`ChunkMatrix::build`].
    pub fn from_package(package: &CanonPolicyPackage) -> Result<Self> {
        let candidates: Vec<Chunk> = package
            .graph
            .chunks()
            .filter(|c| c.policy_area_id.is_some() && c.dimension_id.is_some())
            .cloned()
            .collect();
        Self::build(candidates)
    }

    /// Validates the contract without building, returning a report.
    #[must_use]
    pub fn validate_contract(chunks: &[Chunk]) -> ContractReport {
        let violations = contract_violations(chunks);
        let rendered: Vec<String> = violations
            .iter()
            .take(MAX_RENDERED)
            .map(std::string::ToString::to_string)
            .collect();
        ContractReport {
            checked: chunks.len(),
            valid: violations.is_empty(),
            violation_count: violations.len(),
            violations: rendered,
        }
    }

    /// Strict-equality lookup of one cell.
    #[must_use]
    pub fn get(&self, pa: PolicyArea, dim: Dimension) -> Option<&Chunk> {
        self.cells.get(&(pa, dim))
    }

    /// Number of cells (always 60 for a built matrix).
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` when the matrix has no cells. A built matrix never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates cells in canonical (policy area, dimension) order.
    pub fn iter(&self) -> impl Iterator<Item = (&MatrixKey, &Chunk)> {
        self.cells.iter()
    }
}

/// Collects every contract violation over the candidate chunks.
fn contract_violations(chunks: &[Chunk]) -> Vec<MatrixError> {
    let mut violations = Vec::new();
    let mut occupied: BTreeMap<MatrixKey, usize> = BTreeMap::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let pa_field = chunk.policy_area_id.clone().unwrap_or_default();
        let dim_field = chunk.dimension_id.clone().unwrap_or_default();

        // (a) well-formed structure
        if chunk.text.is_empty() {
            violations.push(MatrixError::MalformedChunk {
                index,
                pa: pa_field.clone(),
                dim: dim_field.clone(),
                reason: "empty text".to_string(),
            });
            continue;
        }
        if chunk.policy_area_id.is_none() || chunk.dimension_id.is_none() {
            violations.push(MatrixError::MalformedChunk {
                index,
                pa: pa_field,
                dim: dim_field,
                reason: "missing policy_area_id or dimension_id".to_string(),
            });
            continue;
        }

        // (b) chunk_id grammar
        let Ok(key) = parse_chunk_id(&chunk.id) else {
            violations.push(MatrixError::InvalidChunkId {
                index,
                chunk_id: chunk.id.clone(),
            });
            continue;
        };

        // (c) id agrees with the fields
        if chunk.id != format!("{pa_field}-{dim_field}") {
            violations.push(MatrixError::IdFieldMismatch {
                index,
                chunk_id: chunk.id.clone(),
                pa: pa_field,
                dim: dim_field,
            });
            continue;
        }

        // (d) cell uniqueness
        if let Some(first_index) = occupied.get(&key) {
            violations.push(MatrixError::DuplicateCell {
                index,
                first_index: *first_index,
                pa: key.0.to_string(),
                dim: key.1.to_string(),
            });
            continue;
        }
        occupied.insert(key, index);
    }

    // (e) full cross-product coverage
    for pa in PolicyArea::all() {
        for dim in Dimension::all() {
            if !occupied.contains_key(&(pa, dim)) {
                violations.push(MatrixError::MissingCell {
                    pa: pa.to_string(),
                    dim: dim.to_string(),
                });
            }
        }
    }

    // (f) exact cardinality
    if chunks.len() != MATRIX_CELL_COUNT {
        violations.push(MatrixError::WrongCardinality {
            found: chunks.len(),
        });
    }

    violations
}

/// Wraps violations: a singleton passes through, several batch up.
fn batch(mut violations: Vec<MatrixError>) -> MatrixError {
    if violations.len() == 1 {
        return violations.remove(0);
    }
    let total = violations.len();
    let first: Vec<String> = violations
        .iter()
        .take(MAX_RENDERED)
        .map(std::string::ToString::to_string)
        .collect();
    MatrixError::Batch {
        total,
        shown: first.len(),
        first,
    }
}
