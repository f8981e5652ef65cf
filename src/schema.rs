//! Expected-element schemas shared by chunks, questions and signals.
//!
//! A schema is either a positional list of element specifications or a
//! keyed map of them. Questions declare what they expect to find; chunks
//! declare what they provide; the irrigation synchronizer checks the two
//! for compatibility.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One expected element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Element type tag (e.g. "indicator", "baseline", "budget_row").
    #[serde(rename = "type")]
    pub element_type: String,
    /// Whether the element must be present.
    #[serde(default)]
    pub required: bool,
    /// Minimum count or magnitude threshold, when numeric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
}

/// An expected-elements schema: a list or a keyed map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaSpec {
    /// Positional element list.
    List(Vec<ElementSpec>),
    /// Keyed element map.
    Map(BTreeMap<String, ElementSpec>),
}

impl SchemaSpec {
    /// Number of elements in the schema.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::List(items) => items.len(),
            Self::Map(items) => items.len(),
        }
    }

    /// Returns `true` if the schema has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty list schema.
    #[must_use]
    pub const fn empty() -> Self {
        Self::List(Vec::new())
    }
}

impl Default for SchemaSpec {
    fn default() -> Self {
        Self::empty()
    }
}

/// The element types each analytical dimension's cell chunks provide.
const DIMENSION_ELEMENT_TYPES: [[&str; 3]; 6] = [
    ["baseline", "indicator", "territory"],
    ["objective", "target", "indicator"],
    ["budget_row", "funding_source", "amount"],
    ["activity", "responsible", "timeline"],
    ["outcome", "indicator", "target"],
    ["mechanism", "assumption", "evidence"],
];

/// The schema a matrix cell chunk declares for its dimension.
///
/// Cell chunks mark every element required with a minimum of 1.0, the
/// most permissive position under the asymmetric implication and
/// minimum-ordering rules: any question schema over the same element
/// types with minima up to 1.0 is compatible.
#[must_use]
pub fn dimension_default_schema(dimension: crate::ids::Dimension) -> SchemaSpec {
    let types = DIMENSION_ELEMENT_TYPES[usize::from(dimension.index()) - 1];
    SchemaSpec::List(
        types
            .iter()
            .map(|t| ElementSpec {
                element_type: (*t).to_string(),
                required: true,
                minimum: Some(1.0),
            })
            .collect(),
    )
}
