//! Memory safety for executor dispatch.
//!
//! Before any argument reaches a method, its estimated size is checked
//! against the per-class cap; oversized strings are truncated, lists are
//! sampled, and dicts are pruned preserving priority keys. Every
//! truncation is recorded as a metric in the task's execution log.

use crate::config::ExecutorMemoryCaps;
use crate::executor::context::{Arg, ArgumentContext};
use crate::io::find_char_boundary;
use serde_json::Value;

/// Executor memory class, mapped from the method's class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryClass {
    /// Entity extraction (1 MB default).
    Entity,
    /// DAG construction (5 MB default).
    Dag,
    /// Causal-effect analysis (10 MB default).
    CausalEffect,
    /// Semantic analysis (2 MB default).
    Semantic,
    /// Financial analysis (2 MB default).
    Financial,
    /// Everything else (5 MB default).
    Generic,
}

impl MemoryClass {
    /// Maps an analysis class name to its memory class.
    #[must_use]
    pub fn for_class(class: &str) -> Self {
        match class {
            "EntityExtractor" => Self::Entity,
            "DagValidator" => Self::Dag,
            "CausalExtractor" => Self::CausalEffect,
            "SemanticAnalyzer" | "CoherenceAnalyzer" => Self::Semantic,
            "FinancialAnalyzer" => Self::Financial,
            _ => Self::Generic,
        }
    }

    /// The configured cap for this class in bytes.
    #[must_use]
    pub const fn cap(self, caps: &ExecutorMemoryCaps) -> usize {
        match self {
            Self::Entity => caps.entity,
            Self::Dag => caps.dag,
            Self::CausalEffect => caps.causal_effect,
            Self::Semantic => caps.semantic,
            Self::Financial => caps.financial,
            Self::Generic => caps.generic,
        }
    }
}

/// Priority keys preserved when pruning a dict under memory pressure.
const PRIORITY_KEYS: [&str; 6] = [
    "patterns",
    "signals",
    "policy_area_id",
    "dimension_id",
    "id",
    "text",
];

/// Estimates the in-memory size of a JSON value in bytes.
#[must_use]
pub fn estimate_value_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => 8,
        Value::Number(_) => 16,
        Value::String(s) => s.len() + 24,
        Value::Array(items) => items.iter().map(estimate_value_size).sum::<usize>() + 24,
        Value::Object(map) => {
            map.iter()
                .map(|(k, v)| k.len() + 24 + estimate_value_size(v))
                .sum::<usize>()
                + 24
        }
    }
}

/// Estimates the size of a string list.
#[must_use]
pub fn estimate_list_size(items: &[String]) -> usize {
    items.iter().map(|s| s.len() + 24).sum::<usize>() + 24
}

/// Applies the memory cap to every context slot a method's parameters
/// reference. Returns one description per truncation performed.
pub fn apply_caps(
    context: &mut ArgumentContext,
    params: &[Arg],
    cap: usize,
) -> Vec<String> {
    let mut truncations = Vec::new();
    for param in params {
        match param {
            Arg::Text => {
                if context.text.len() > cap {
                    let boundary = find_char_boundary(&context.text, cap);
                    context.text.truncate(boundary);
                    truncations.push(format!("text truncated to {boundary} bytes"));
                }
            }
            Arg::Sentences => {
                if estimate_list_size(&context.sentences) > cap {
                    let kept = sample_list(&mut context.sentences, cap);
                    truncations.push(format!("sentences sampled to {kept} entries"));
                }
            }
            Arg::Segments => {
                if estimate_list_size(&context.segments) > cap {
                    let kept = sample_list(&mut context.segments, cap);
                    truncations.push(format!("segments sampled to {kept} entries"));
                }
            }
            Arg::Statements => {
                if estimate_list_size(&context.statements) > cap {
                    let kept = sample_list(&mut context.statements, cap);
                    truncations.push(format!("statements sampled to {kept} entries"));
                }
            }
            Arg::Tables => {
                let size: usize = context.tables.iter().map(estimate_value_size).sum();
                if size > cap {
                    let target = context.tables.len() / 2;
                    context.tables.truncate(target.max(1));
                    truncations.push(format!("tables sampled to {} entries", context.tables.len()));
                }
            }
            Arg::Data => {
                if estimate_value_size(&context.data) > cap {
                    prune_dict(&mut context.data);
                    truncations.push("data dict pruned to priority keys".to_string());
                }
            }
            Arg::Document => {
                if estimate_value_size(&context.document) > cap {
                    prune_dict(&mut context.document);
                    truncations.push("document dict pruned to priority keys".to_string());
                }
            }
            Arg::Graph | Arg::SourceNode | Arg::TargetNode => {}
        }
    }
    truncations
}

/// Drops entries from the tail until the estimated size halves, keeping
/// head-of-list order (early content carries the structural headers).
fn sample_list(items: &mut Vec<String>, cap: usize) -> usize {
    while items.len() > 1 && estimate_list_size(items) > cap {
        items.truncate(items.len() / 2);
    }
    items.len()
}

/// Removes non-priority keys from a JSON object in place.
fn prune_dict(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|key, _| PRIORITY_KEYS.contains(&key.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_class_mapping() {
        assert_eq!(MemoryClass::for_class("EntityExtractor"), MemoryClass::Entity);
        assert_eq!(MemoryClass::for_class("DagValidator"), MemoryClass::Dag);
        assert_eq!(
            MemoryClass::for_class("CausalExtractor"),
            MemoryClass::CausalEffect
        );
        assert_eq!(
            MemoryClass::for_class("FinancialAnalyzer"),
            MemoryClass::Financial
        );
        assert_eq!(MemoryClass::for_class("PatternDetector"), MemoryClass::Generic);
    }

    #[test]
    fn test_caps_lookup() {
        let caps = ExecutorMemoryCaps::default();
        assert_eq!(MemoryClass::Entity.cap(&caps), 1024 * 1024);
        assert_eq!(MemoryClass::CausalEffect.cap(&caps), 10 * 1024 * 1024);
    }

    #[test]
    fn test_estimate_sizes() {
        assert!(estimate_value_size(&json!(null)) > 0);
        let small = estimate_value_size(&json!({"k": "v"}));
        let large = estimate_value_size(&json!({"k": "v".repeat(1000)}));
        assert!(large > small);
    }

    #[test]
    fn test_text_truncation_records_metric() {
        let mut context = ArgumentContext {
            text: "x".repeat(2000),
            ..ArgumentContext::default()
        };
        let truncations = apply_caps(&mut context, &[Arg::Text], 1000);
        assert_eq!(truncations.len(), 1);
        assert!(context.text.len() <= 1000);
        assert!(truncations[0].contains("text truncated"));
    }

    #[test]
    fn test_text_truncation_respects_char_boundary() {
        let mut context = ArgumentContext {
            text: "ñ".repeat(600), // 1200 bytes
            ..ArgumentContext::default()
        };
        let _ = apply_caps(&mut context, &[Arg::Text], 1001);
        assert!(context.text.is_char_boundary(context.text.len()));
        assert!(context.text.len() <= 1001);
    }

    #[test]
    fn test_list_sampling() {
        let mut context = ArgumentContext {
            sentences: (0..100).map(|i| format!("frase numero {i}")).collect(),
            ..ArgumentContext::default()
        };
        let truncations = apply_caps(&mut context, &[Arg::Sentences], 500);
        assert!(!truncations.is_empty());
        assert!(context.sentences.len() < 100);
        // Head preserved
        assert_eq!(context.sentences[0], "frase numero 0");
    }

    #[test]
    fn test_dict_pruning_preserves_priority_keys() {
        let mut context = ArgumentContext {
            data: json!({
                "patterns": [1, 2, 3],
                "noise": "x".repeat(500),
                "policy_area_id": "PA01",
            }),
            ..ArgumentContext::default()
        };
        let truncations = apply_caps(&mut context, &[Arg::Data], 100);
        assert_eq!(truncations.len(), 1);
        let map = context.data.as_object().unwrap();
        assert!(map.contains_key("patterns"));
        assert!(map.contains_key("policy_area_id"));
        assert!(!map.contains_key("noise"));
    }

    #[test]
    fn test_no_truncation_under_cap() {
        let mut context = ArgumentContext {
            text: "corto".to_string(),
            ..ArgumentContext::default()
        };
        let truncations = apply_caps(&mut context, &[Arg::Text], 1024);
        assert!(truncations.is_empty());
        assert_eq!(context.text, "corto");
    }
}
