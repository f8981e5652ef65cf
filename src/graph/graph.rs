//! Chunk graph: adjacency table with six typed edge kinds.
//!
//! `CONTAINS` strictly nests MICRO inside MESO inside MACRO and must be
//! acyclic; `PRECEDES` totalizes order within a resolution level; the
//! remaining four kinds form arbitrary DAG edges. Every chunk except the
//! macro roots must be the target of at least one `CONTAINS` edge.

use crate::error::{IngestError, Result};
use crate::graph::chunk::{Chunk, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The six edge types of the chunk graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Reading order within a resolution level.
    Precedes,
    /// Strict nesting: MACRO contains MESO contains MICRO.
    Contains,
    /// Cross-reference between chunks.
    RefersTo,
    /// Definition linkage (term defined elsewhere).
    DefinedBy,
    /// Budget row justified by narrative text.
    JustifiesBudget,
    /// KPI satisfied by a meta or programa.
    SatisfiesIndicator,
}

/// A directed, typed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source chunk id.
    pub from: String,
    /// Target chunk id.
    pub to: String,
    /// Edge type.
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

/// The chunk graph: chunks plus a typed adjacency table, both keyed by
/// chunk id so iteration order is always deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkGraph {
    chunks: BTreeMap<String, Chunk>,
    edges: Vec<Edge>,
}

impl ChunkGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` when the graph has no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Inserts a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if a chunk with the same id already exists.
    pub fn insert_chunk(&mut self, chunk: Chunk) -> Result<()> {
        if self.chunks.contains_key(&chunk.id) {
            return Err(IngestError::GraphInvariant {
                chunk_id: chunk.id,
                reason: "duplicate chunk id".to_string(),
            }
            .into());
        }
        self.chunks.insert(chunk.id.clone(), chunk);
        Ok(())
    }

    /// Adds a typed edge between existing chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is missing, or if a `CONTAINS`
    /// edge would break the strict resolution nesting.
    pub fn add_edge(&mut self, from: &str, to: &str, edge_type: EdgeType) -> Result<()> {
        let from_chunk = self.chunks.get(from).ok_or_else(|| IngestError::GraphInvariant {
            chunk_id: from.to_string(),
            reason: "edge source not in graph".to_string(),
        })?;
        let to_chunk = self.chunks.get(to).ok_or_else(|| IngestError::GraphInvariant {
            chunk_id: to.to_string(),
            reason: "edge target not in graph".to_string(),
        })?;

        if edge_type == EdgeType::Contains
            && from_chunk.resolution.finer() != Some(to_chunk.resolution)
        {
            return Err(IngestError::GraphInvariant {
                chunk_id: to.to_string(),
                reason: format!(
                    "CONTAINS must nest one level: {:?} cannot contain {:?}",
                    from_chunk.resolution, to_chunk.resolution
                ),
            }
            .into());
        }
        if edge_type == EdgeType::Precedes && from_chunk.resolution != to_chunk.resolution {
            return Err(IngestError::GraphInvariant {
                chunk_id: to.to_string(),
                reason: "PRECEDES must connect chunks of the same resolution".to_string(),
            }
            .into());
        }

        self.edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
            edge_type,
        });
        Ok(())
    }

    /// Looks up a chunk by id.
    #[must_use]
    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// Iterates chunks in id order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// All edges, in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges of one type, in insertion order.
    pub fn edges_of_type(&self, edge_type: EdgeType) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.edge_type == edge_type)
    }

    /// Outgoing edges of a chunk.
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Chunks of one resolution, in id order.
    pub fn chunks_at(&self, resolution: Resolution) -> impl Iterator<Item = &Chunk> {
        self.chunks.values().filter(move |c| c.resolution == resolution)
    }

    /// Checks that edges of the given type form no cycle.
    #[must_use]
    pub fn is_acyclic(&self, edge_type: EdgeType) -> bool {
        // Kahn's algorithm over the sub-graph of one edge type.
        let mut indegree: BTreeMap<&str, usize> =
            self.chunks.keys().map(|k| (k.as_str(), 0)).collect();
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut edge_count = 0usize;
        for edge in self.edges_of_type(edge_type) {
            adjacency.entry(&edge.from).or_default().push(&edge.to);
            if let Some(d) = indegree.get_mut(edge.to.as_str()) {
                *d += 1;
            }
            edge_count += 1;
        }
        if edge_count == 0 {
            return true;
        }

        let mut queue: Vec<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();
        let mut visited = 0usize;
        while let Some(node) = queue.pop() {
            visited += 1;
            if let Some(next) = adjacency.get(node) {
                for to in next {
                    if let Some(d) = indegree.get_mut(*to) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push(*to);
                        }
                    }
                }
            }
        }
        visited == self.chunks.len()
    }

    /// Validates the graph invariants and returns every violation.
    ///
    /// - `CONTAINS` and `PRECEDES` are acyclic.
    /// - Every chunk except MACRO roots is the target of at least one
    ///   `CONTAINS` edge.
    /// - `PRECEDES` forms a linear order within each resolution level
    ///   (in/out degree at most one).
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if !self.is_acyclic(EdgeType::Contains) {
            violations.push("CONTAINS edges form a cycle".to_string());
        }
        if !self.is_acyclic(EdgeType::Precedes) {
            violations.push("PRECEDES edges form a cycle".to_string());
        }

        let contained: BTreeSet<&str> = self
            .edges_of_type(EdgeType::Contains)
            .map(|e| e.to.as_str())
            .collect();
        for chunk in self.chunks.values() {
            if chunk.resolution != Resolution::Macro && !contained.contains(chunk.id.as_str()) {
                violations.push(format!(
                    "chunk {} ({:?}) has no CONTAINS parent",
                    chunk.id, chunk.resolution
                ));
            }
        }

        let mut out_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        for edge in self.edges_of_type(EdgeType::Precedes) {
            *out_degree.entry(edge.from.as_str()).or_default() += 1;
            *in_degree.entry(edge.to.as_str()).or_default() += 1;
        }
        for (id, degree) in &out_degree {
            if *degree > 1 {
                violations.push(format!("chunk {id} has {degree} outgoing PRECEDES edges"));
            }
        }
        for (id, degree) in &in_degree {
            if *degree > 1 {
                violations.push(format!("chunk {id} has {degree} incoming PRECEDES edges"));
            }
        }

        violations
    }

    /// Fraction of chunks satisfying the nesting invariant, used by the
    /// `structural_consistency` quality gate.
    #[must_use]
    pub fn structural_consistency(&self) -> f64 {
        if self.chunks.is_empty() {
            return 1.0;
        }
        let contained: BTreeSet<&str> = self
            .edges_of_type(EdgeType::Contains)
            .map(|e| e.to.as_str())
            .collect();
        let consistent = self
            .chunks
            .values()
            .filter(|c| c.resolution == Resolution::Macro || contained.contains(c.id.as_str()))
            .count();
        consistent as f64 / self.chunks.len() as f64
    }
}
