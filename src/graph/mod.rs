//! Multi-resolution chunk graph.
//!
//! Chunks are contiguous, semantically coherent spans of the content
//! stream at three resolutions (MICRO, MESO, MACRO). The graph wires them
//! with six typed edge kinds and is represented as an adjacency table
//! keyed by chunk id, never as pointer-threaded nodes.

pub mod chunk;
pub mod graph;

pub use chunk::{
    BudgetRecord, Chunk, GeoFacets, KpiRecord, LayerConfidence, PolicyFacets, Resolution,
    TemporalFacets, TextSpan,
};
pub use graph::{ChunkGraph, Edge, EdgeType};
