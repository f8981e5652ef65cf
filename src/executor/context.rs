//! Argument context and the alias table.
//!
//! Method sequences name their parameters by alias; the dispatcher
//! resolves every alias to a field of this single struct. No runtime
//! reflection: the alias table is a compile-time match.

use crate::io::unicode::sentence_spans;
use serde_json::Value;
use std::collections::BTreeMap;

/// A typed argument slot of the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    /// Primary input dict (patterns, signals).
    Data,
    /// The chunk or document record.
    Document,
    /// Chunk text.
    Text,
    /// Chunk sentences.
    Sentences,
    /// Chunk tables.
    Tables,
    /// Chunk MICRO children / text segments.
    Segments,
    /// Causal graph extracted earlier in the sequence.
    Graph,
    /// Graph source vertex.
    SourceNode,
    /// Graph sink vertex.
    TargetNode,
    /// Extracted policy-statement list.
    Statements,
}

/// Resolves a parameter alias to its argument slot.
///
/// Returns `None` for unknown aliases; the dispatcher treats that as an
/// unresolvable argument, never as a silent default.
#[must_use]
pub fn resolve_alias(alias: &str) -> Option<Arg> {
    match alias {
        "data" | "payload" | "input_data" => Some(Arg::Data),
        "doc" | "document" | "preprocessed_document" => Some(Arg::Document),
        "text" | "raw_text" | "document_text" => Some(Arg::Text),
        "sentences" | "relevant_sentences" => Some(Arg::Sentences),
        "tables" | "table_data" => Some(Arg::Tables),
        "segments" | "text_segments" => Some(Arg::Segments),
        "grafo" | "graph" | "causal_graph" | "dag" => Some(Arg::Graph),
        "origen" | "source" | "source_node" => Some(Arg::SourceNode),
        "destino" | "target" | "target_node" => Some(Arg::TargetNode),
        "statements" | "policy_statements" => Some(Arg::Statements),
        _ => None,
    }
}

/// A causal graph extracted from policy statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CausalGraph {
    /// Node labels in extraction order.
    pub nodes: Vec<String>,
    /// Directed edges as (from, to) node indices.
    pub edges: Vec<(usize, usize)>,
}

impl CausalGraph {
    /// Index of the source vertex (no incoming edges), if unique-ish:
    /// the first node without incoming edges.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        (0..self.nodes.len())
            .find(|i| !self.edges.iter().any(|(_, to)| to == i))
            .and_then(|i| self.nodes.get(i).map(String::as_str))
    }

    /// The sink vertex: the first node without outgoing edges.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        (0..self.nodes.len())
            .find(|i| !self.edges.iter().any(|(from, _)| from == i))
            .and_then(|i| self.nodes.get(i).map(String::as_str))
    }

    /// Counts distinct acyclic paths from the source to the sink.
    ///
    /// Bounded depth-first walk; revisits are pruned so cyclic inputs
    /// terminate.
    #[must_use]
    pub fn path_count(&self) -> usize {
        let Some(source) = (0..self.nodes.len())
            .find(|i| !self.edges.iter().any(|(_, to)| to == i))
        else {
            return 0;
        };
        let Some(target) = (0..self.nodes.len())
            .find(|i| !self.edges.iter().any(|(from, _)| from == i))
        else {
            return 0;
        };
        if source == target {
            return usize::from(!self.nodes.is_empty());
        }
        let mut visited = vec![false; self.nodes.len()];
        self.count_paths(source, target, &mut visited)
    }

    fn count_paths(&self, from: usize, target: usize, visited: &mut Vec<bool>) -> usize {
        if from == target {
            return 1;
        }
        if let Some(slot) = visited.get_mut(from) {
            if *slot {
                return 0;
            }
            *slot = true;
        }
        let mut count = 0;
        for (a, b) in &self.edges {
            if *a == from {
                count += self.count_paths(*b, target, visited);
            }
        }
        if let Some(slot) = visited.get_mut(from) {
            *slot = false;
        }
        count
    }
}

/// The evolving argument context of one task execution.
#[derive(Debug, Clone, Default)]
pub struct ArgumentContext {
    /// Primary input dict: the task's patterns and resolved signals.
    pub data: Value,
    /// The chunk record as JSON.
    pub document: Value,
    /// Chunk text.
    pub text: String,
    /// Chunk sentences.
    pub sentences: Vec<String>,
    /// Chunk tables (KPI and budget rows as JSON).
    pub tables: Vec<Value>,
    /// Text segments (paragraph-level subdivisions).
    pub segments: Vec<String>,
    /// Causal graph, populated by the extraction methods.
    pub graph: Option<CausalGraph>,
    /// Extracted policy statements.
    pub statements: Vec<String>,
    /// Prior method outputs keyed `Class::method`.
    pub outputs: BTreeMap<String, Value>,
}

impl ArgumentContext {
    /// Builds the initial context for a chunk and its task inputs.
    #[must_use]
    pub fn for_chunk(chunk: &crate::graph::Chunk, data: Value) -> Self {
        let sentences: Vec<String> = sentence_spans(&chunk.text)
            .into_iter()
            .map(|(start, end)| chunk.text[start..end].trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let segments: Vec<String> = chunk
            .text
            .split("\n\n")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let mut tables: Vec<Value> = Vec::new();
        for kpi in &chunk.kpis {
            if let Ok(value) = serde_json::to_value(kpi) {
                tables.push(value);
            }
        }
        for budget in &chunk.budgets {
            if let Ok(value) = serde_json::to_value(budget) {
                tables.push(value);
            }
        }
        Self {
            data,
            document: serde_json::to_value(chunk).unwrap_or(Value::Null),
            text: chunk.text.clone(),
            sentences,
            tables,
            segments,
            graph: None,
            statements: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Whether the slot an argument resolves to is populated.
    ///
    /// Produced-by-sequence slots (graph, statements, vertex handles)
    /// count as populated once their producer has run, even when the
    /// produced value is legitimately empty for the chunk.
    #[must_use]
    pub fn is_populated(&self, arg: Arg) -> bool {
        match arg {
            Arg::Data => !self.data.is_null(),
            Arg::Document => !self.document.is_null(),
            Arg::Text => !self.text.is_empty(),
            Arg::Sentences => !self.sentences.is_empty(),
            Arg::Tables => true, // a chunk may legitimately have no tables
            Arg::Segments => !self.segments.is_empty(),
            Arg::Graph | Arg::SourceNode | Arg::TargetNode => self.graph.is_some(),
            Arg::Statements => {
                !self.statements.is_empty()
                    || self.outputs.contains_key("CausalExtractor::extract_statements")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Chunk, Resolution, TextSpan};
    use serde_json::json;

    #[test]
    fn test_alias_groups_resolve() {
        assert_eq!(resolve_alias("data"), Some(Arg::Data));
        assert_eq!(resolve_alias("payload"), Some(Arg::Data));
        assert_eq!(resolve_alias("input_data"), Some(Arg::Data));
        assert_eq!(resolve_alias("grafo"), Some(Arg::Graph));
        assert_eq!(resolve_alias("dag"), Some(Arg::Graph));
        assert_eq!(resolve_alias("origen"), Some(Arg::SourceNode));
        assert_eq!(resolve_alias("destino"), Some(Arg::TargetNode));
        assert_eq!(resolve_alias("policy_statements"), Some(Arg::Statements));
        assert_eq!(resolve_alias("preprocessed_document"), Some(Arg::Document));
        assert_eq!(resolve_alias("raw_text"), Some(Arg::Text));
        assert_eq!(resolve_alias("relevant_sentences"), Some(Arg::Sentences));
        assert_eq!(resolve_alias("table_data"), Some(Arg::Tables));
        assert_eq!(resolve_alias("text_segments"), Some(Arg::Segments));
    }

    #[test]
    fn test_unknown_alias_is_none() {
        assert_eq!(resolve_alias("unknown_thing"), None);
        assert_eq!(resolve_alias(""), None);
    }

    #[test]
    fn test_context_for_chunk() {
        let chunk = Chunk::new(
            "PA01-DIM01",
            "Primera meta del plan. Segunda meta del plan.\n\nOtro parrafo.",
            Resolution::Meso,
            TextSpan::new(0, 61),
        );
        let context = ArgumentContext::for_chunk(&chunk, json!({"patterns": []}));
        assert!(context.sentences.len() >= 2);
        assert_eq!(context.segments.len(), 2);
        assert!(context.is_populated(Arg::Text));
        assert!(!context.is_populated(Arg::Graph));
        assert!(context.is_populated(Arg::Data));
    }

    #[test]
    fn test_causal_graph_linear_path() {
        let graph = CausalGraph {
            nodes: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            edges: vec![(0, 1), (1, 2)],
        };
        assert_eq!(graph.source(), Some("a"));
        assert_eq!(graph.target(), Some("c"));
        assert_eq!(graph.path_count(), 1);
    }

    #[test]
    fn test_causal_graph_diamond() {
        let graph = CausalGraph {
            nodes: vec!["s".into(), "x".into(), "y".into(), "t".into()],
            edges: vec![(0, 1), (0, 2), (1, 3), (2, 3)],
        };
        assert_eq!(graph.path_count(), 2);
    }

    #[test]
    fn test_causal_graph_empty() {
        assert_eq!(CausalGraph::default().path_count(), 0);
    }

    #[test]
    fn test_causal_graph_cycle_terminates() {
        // a -> b -> a cycle plus sink c
        let graph = CausalGraph {
            nodes: vec!["a".into(), "b".into(), "c".into()],
            edges: vec![(0, 1), (1, 0), (1, 2)],
        };
        // No node without incoming edges among {a, b}; c qualifies as sink.
        // Source detection fails (a and b both have incoming), yielding 0.
        assert_eq!(graph.path_count(), 0);
    }
}
