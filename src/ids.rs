//! Canonical identifiers for the evaluation instrument.
//!
//! Policy areas are `PA01`..`PA10`, dimensions are `DIM01`..`DIM06`, and
//! executor base slots are `D1-Q1`..`D6-Q5`. Parsing is fallible and
//! normalizing: `Dk-Qj` and `DkQj` are accepted interchangeably, hyphens
//! and underscores are stripped before lookup, and short dimension forms
//! (`D1`) normalize to the canonical `DIM01`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of policy areas in the instrument.
pub const POLICY_AREA_COUNT: u8 = 10;

/// Number of analytical dimensions in the instrument.
pub const DIMENSION_COUNT: u8 = 6;

/// Questions per (dimension, slot) group.
pub const QUESTIONS_PER_DIMENSION: u8 = 5;

/// Total micro-questions in the instrument.
pub const QUESTION_COUNT: usize = 300;

/// Total (policy area, dimension) chunk matrix cells.
pub const MATRIX_CELL_COUNT: usize = (POLICY_AREA_COUNT as usize) * (DIMENSION_COUNT as usize);

/// A policy area, `PA01` through `PA10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PolicyArea(u8);

impl PolicyArea {
    /// Creates a policy area from its 1-based index.
    ///
    /// # Errors
    ///
    /// Returns `None` if `index` is not in `1..=10`.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index >= 1 && index <= POLICY_AREA_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Returns the 1-based index (1..=10).
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Iterates all ten policy areas in canonical order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=POLICY_AREA_COUNT).map(Self)
    }
}

impl fmt::Display for PolicyArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA{:02}", self.0)
    }
}

impl FromStr for PolicyArea {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canon = strip_separators(s);
        let digits = canon
            .strip_prefix("PA")
            .ok_or_else(|| IdParseError::policy_area(s))?;
        let index: u8 = digits.parse().map_err(|_| IdParseError::policy_area(s))?;
        Self::new(index).ok_or_else(|| IdParseError::policy_area(s))
    }
}

impl TryFrom<String> for PolicyArea {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PolicyArea> for String {
    fn from(pa: PolicyArea) -> Self {
        pa.to_string()
    }
}

/// An analytical dimension, `DIM01` through `DIM06`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dimension(u8);

impl Dimension {
    /// Creates a dimension from its 1-based index.
    ///
    /// # Errors
    ///
    /// Returns `None` if `index` is not in `1..=6`.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index >= 1 && index <= DIMENSION_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Returns the 1-based index (1..=6).
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Iterates all six dimensions in canonical order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=DIMENSION_COUNT).map(Self)
    }

    /// Returns the short form used by base slots (`D1`..`D6`).
    #[must_use]
    pub fn short(self) -> String {
        format!("D{}", self.0)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DIM{:02}", self.0)
    }
}

impl FromStr for Dimension {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canon = strip_separators(s);
        // Accept both the canonical DIM01..DIM06 and the short D1..D6 forms.
        let digits = canon
            .strip_prefix("DIM")
            .or_else(|| canon.strip_prefix('D'))
            .ok_or_else(|| IdParseError::dimension(s))?;
        let index: u8 = digits.parse().map_err(|_| IdParseError::dimension(s))?;
        Self::new(index).ok_or_else(|| IdParseError::dimension(s))
    }
}

impl TryFrom<String> for Dimension {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Dimension> for String {
    fn from(dim: Dimension) -> Self {
        dim.to_string()
    }
}

/// A chunk matrix key: one (policy area, dimension) cell.
pub type MatrixKey = (PolicyArea, Dimension);

/// Renders the canonical chunk id for a matrix cell, `PA{nn}-DIM{nn}`.
#[must_use]
pub fn chunk_id(pa: PolicyArea, dim: Dimension) -> String {
    format!("{pa}-{dim}")
}

/// Parses a chunk id of the form `PA{nn}-DIM{nn}` into its matrix key.
///
/// # Errors
///
/// Returns [`IdParseError`] if the id does not match the grammar or either
/// component is out of range.
pub fn parse_chunk_id(id: &str) -> Result<MatrixKey, IdParseError> {
    let (pa_part, dim_part) = id.split_once('-').ok_or_else(|| IdParseError::chunk(id))?;
    // Reject forms where the separators were already stripped or doubled;
    // the chunk id grammar is strict even though slot ids are lenient.
    if !pa_part.starts_with("PA") || !dim_part.starts_with("DIM") {
        return Err(IdParseError::chunk(id));
    }
    let pa = pa_part.parse().map_err(|_| IdParseError::chunk(id))?;
    let dim = dim_part.parse().map_err(|_| IdParseError::chunk(id))?;
    Ok((pa, dim))
}

/// An executor base slot, `Dk-Qj` with k in 1..=6 and j in 1..=5.
///
/// The 30 slots form the executor dispatch table; each of the 300 questions
/// carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseSlot {
    dimension: u8,
    question: u8,
}

impl BaseSlot {
    /// Creates a base slot from 1-based dimension and question indices.
    #[must_use]
    pub const fn new(dimension: u8, question: u8) -> Option<Self> {
        if dimension >= 1
            && dimension <= DIMENSION_COUNT
            && question >= 1
            && question <= QUESTIONS_PER_DIMENSION
        {
            Some(Self {
                dimension,
                question,
            })
        } else {
            None
        }
    }

    /// Returns the dimension this slot belongs to.
    #[must_use]
    pub const fn dimension(self) -> Dimension {
        Dimension(self.dimension)
    }

    /// Returns the 1-based question index within the dimension (1..=5).
    #[must_use]
    pub const fn question(self) -> u8 {
        self.question
    }

    /// Iterates all 30 base slots in canonical (dimension, question) order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=DIMENSION_COUNT).flat_map(|d| {
            (1..=QUESTIONS_PER_DIMENSION).map(move |q| Self {
                dimension: d,
                question: q,
            })
        })
    }
}

impl fmt::Display for BaseSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}-Q{}", self.dimension, self.question)
    }
}

impl FromStr for BaseSlot {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "D1-Q1", "D1Q1", "d1_q1" all normalize to the same slot.
        let canon = strip_separators(s);
        let rest = canon
            .strip_prefix('D')
            .ok_or_else(|| IdParseError::slot(s))?;
        let (d_part, q_part) = rest.split_once('Q').ok_or_else(|| IdParseError::slot(s))?;
        let dimension: u8 = d_part.parse().map_err(|_| IdParseError::slot(s))?;
        let question: u8 = q_part.parse().map_err(|_| IdParseError::slot(s))?;
        Self::new(dimension, question).ok_or_else(|| IdParseError::slot(s))
    }
}

impl TryFrom<String> for BaseSlot {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BaseSlot> for String {
    fn from(slot: BaseSlot) -> Self {
        slot.to_string()
    }
}

/// Error raised when an identifier fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} identifier: {input:?}")]
pub struct IdParseError {
    /// Kind of identifier being parsed.
    pub kind: &'static str,
    /// The offending input.
    pub input: String,
}

impl IdParseError {
    fn policy_area(input: &str) -> Self {
        Self {
            kind: "policy area",
            input: input.to_string(),
        }
    }

    fn dimension(input: &str) -> Self {
        Self {
            kind: "dimension",
            input: input.to_string(),
        }
    }

    fn slot(input: &str) -> Self {
        Self {
            kind: "base slot",
            input: input.to_string(),
        }
    }

    fn chunk(input: &str) -> Self {
        Self {
            kind: "chunk",
            input: input.to_string(),
        }
    }
}

/// Uppercases and strips hyphens and underscores before lookup.
fn strip_separators(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
