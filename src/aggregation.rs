//! Aggregation: dimension, policy-area and overall rollups.
//!
//! All rollups use explicit lists and indexed iteration so output never
//! depends on hash ordering. Weights must sum to 1.0 within 1e-6. In
//! strict mode incomplete coverage raises; in non-strict mode an empty
//! score list yields 0.0 only after a coverage warning is emitted.

use crate::config::{AggregationConfig, WEIGHT_SUM_EPSILON};
use crate::error::{AggregationError, Result};
use crate::ids::{Dimension, PolicyArea};
use crate::scoring::ScoredResult;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Questions per (policy area, dimension) cell.
const QUESTIONS_PER_CELL: usize = 5;

/// One dimension rollup with full diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionScore {
    /// Policy area of the cell.
    pub policy_area: PolicyArea,
    /// Dimension of the cell.
    pub dimension: Dimension,
    /// Weighted mean of the question scores.
    pub score: f64,
    /// The question scores in question order.
    pub question_scores: Vec<f64>,
    /// The weights applied.
    pub weights: Vec<f64>,
    /// Coverage: expected and found question counts.
    pub coverage: CoverageInfo,
}

/// One policy-area rollup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyAreaScore {
    /// The policy area.
    pub policy_area: PolicyArea,
    /// Weighted mean of the dimension scores.
    pub score: f64,
    /// The dimension scores in dimension order.
    pub dimension_scores: Vec<f64>,
}

/// The full aggregation output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateScores {
    /// All 60 dimension rollups in canonical order.
    pub dimensions: Vec<DimensionScore>,
    /// All 10 policy-area rollups in canonical order.
    pub policy_areas: Vec<PolicyAreaScore>,
    /// The overall document score.
    pub overall: f64,
}

/// Coverage diagnostics for a rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageInfo {
    /// Scores expected.
    pub expected: usize,
    /// Scores found.
    pub found: usize,
}

/// Computes a weighted mean with indexed iteration.
///
/// # Errors
///
/// Returns an error when arity differs or weights do not sum to 1.
pub fn weighted_mean(scope: &str, scores: &[f64], weights: &[f64]) -> Result<f64> {
    if scores.len() != weights.len() {
        return Err(AggregationError::WeightArity {
            scope: scope.to_string(),
            weights: weights.len(),
            scores: scores.len(),
        }
        .into());
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
        return Err(AggregationError::WeightSum {
            scope: scope.to_string(),
            sum,
            tolerance: WEIGHT_SUM_EPSILON,
        }
        .into());
    }
    let mut total = 0.0;
    for index in 0..scores.len() {
        total += scores[index] * weights[index];
    }
    Ok(total)
}

/// Rolls the 300 scored results up to dimension, policy-area and overall
/// scores.
///
/// # Errors
///
/// In strict mode, any cell with other than five question scores raises
/// a coverage error; weight violations always raise.
pub fn aggregate(results: &[ScoredResult], config: &AggregationConfig) -> Result<AggregateScores> {
    // Group scores by cell, keyed deterministically
    let mut by_cell: BTreeMap<(PolicyArea, Dimension), Vec<(u32, f64)>> = BTreeMap::new();
    for result in results {
        by_cell
            .entry((result.policy_area(), result.dimension()))
            .or_default()
            .push((result.question_global(), result.normalized_score()));
    }

    let mut dimensions = Vec::with_capacity(60);
    for pa in PolicyArea::all() {
        for dim in Dimension::all() {
            let scope = format!("{pa}-{dim}");
            let mut cell = by_cell.remove(&(pa, dim)).unwrap_or_default();
            cell.sort_by_key(|(question_global, _)| *question_global);
            let scores: Vec<f64> = cell.iter().map(|(_, score)| *score).collect();

            let coverage = CoverageInfo {
                expected: QUESTIONS_PER_CELL,
                found: scores.len(),
            };
            if scores.len() != QUESTIONS_PER_CELL {
                if config.abort_on_insufficient_coverage {
                    return Err(AggregationError::Coverage {
                        scope,
                        expected: QUESTIONS_PER_CELL,
                        found: scores.len(),
                    }
                    .into());
                }
                warn!(
                    scope = %scope,
                    expected = QUESTIONS_PER_CELL,
                    found = scores.len(),
                    "coverage error: incomplete cell, scoring 0.0"
                );
                dimensions.push(DimensionScore {
                    policy_area: pa,
                    dimension: dim,
                    score: 0.0,
                    question_scores: scores,
                    weights: config.question_weights.clone(),
                    coverage,
                });
                continue;
            }

            let score = weighted_mean(&scope, &scores, &config.question_weights)?;
            dimensions.push(DimensionScore {
                policy_area: pa,
                dimension: dim,
                score,
                question_scores: scores,
                weights: config.question_weights.clone(),
                coverage,
            });
        }
    }

    let mut policy_areas = Vec::with_capacity(10);
    for pa in PolicyArea::all() {
        let scope = pa.to_string();
        let dimension_scores: Vec<f64> = dimensions
            .iter()
            .filter(|d| d.policy_area == pa)
            .map(|d| d.score)
            .collect();
        let score = weighted_mean(&scope, &dimension_scores, &config.dimension_weights)?;
        policy_areas.push(PolicyAreaScore {
            policy_area: pa,
            score,
            dimension_scores,
        });
    }

    let area_scores: Vec<f64> = policy_areas.iter().map(|p| p.score).collect();
    let overall = weighted_mean("overall", &area_scores, &config.policy_area_weights)?;

    Ok(AggregateScores {
        dimensions,
        policy_areas,
        overall,
    })
}
