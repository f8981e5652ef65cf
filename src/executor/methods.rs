//! The analysis method library.
//!
//! Deterministic analysis functions registered with a typed signature and
//! parameter aliases. Every function reads (and where declared, updates)
//! the [`ArgumentContext`] and returns a JSON fragment that the
//! dispatcher merges into the task's evidence dict. No randomness, no
//! I/O: the same context always yields the same fragment.

use crate::executor::context::{Arg, ArgumentContext, CausalGraph};
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

/// Signature of every registered analysis function.
pub type MethodFn = fn(&mut ArgumentContext) -> std::result::Result<Value, String>;

/// Looks up a registered method and its declared parameter slots.
///
/// The registry is a compile-time match, not a runtime reflection table;
/// unknown (class, method) pairs resolve to `None`.
#[must_use]
pub fn method_entry(class: &str, method: &str) -> Option<(MethodFn, &'static [Arg])> {
    match (class, method) {
        ("PatternDetector", "detect_patterns") => {
            Some((detect_patterns, &[Arg::Data, Arg::Text]))
        }
        ("NumericalAnalyzer", "extract_claims") => Some((extract_claims, &[Arg::Text])),
        ("NumericalAnalyzer", "identify_gaps") => Some((identify_gaps, &[Arg::Sentences])),
        ("RiskAssessor", "assess_risks") => Some((assess_risks, &[Arg::Sentences])),
        ("CausalExtractor", "extract_statements") => {
            Some((extract_statements, &[Arg::Sentences]))
        }
        ("CausalExtractor", "build_graph") => Some((build_graph, &[Arg::Statements])),
        ("DagValidator", "trace_paths") => {
            Some((trace_paths, &[Arg::Graph, Arg::SourceNode, Arg::TargetNode]))
        }
        ("DagValidator", "validate_acyclic") => Some((validate_acyclic, &[Arg::Graph])),
        ("CoherenceAnalyzer", "count_contradictions") => {
            Some((count_contradictions, &[Arg::Sentences]))
        }
        ("BaselineDetector", "detect_baselines") => Some((detect_baselines, &[Arg::Text])),
        ("FinancialAnalyzer", "trace_budget") => {
            Some((trace_budget, &[Arg::Tables, Arg::Text]))
        }
        ("MechanismInferencer", "assess_plausibility") => {
            Some((assess_plausibility, &[Arg::Graph, Arg::Statements]))
        }
        ("EvidentialTester", "hoop_test") => Some((hoop_test, &[Arg::Data, Arg::Text])),
        ("EvidentialTester", "smoking_gun_test") => {
            Some((smoking_gun_test, &[Arg::Data, Arg::Text]))
        }
        ("ConfidenceAggregator", "aggregate") => Some((aggregate_confidence, &[Arg::Data])),
        _ => None,
    }
}

// Numbers with thousands separators, percentages, currency amounts
#[allow(clippy::unwrap_used)]
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(COP\s*)?\$?\d{1,3}(\.\d{3})+|\d+([.,]\d+)?\s*%|\b\d+([.,]\d+)?\b").unwrap()
});

#[allow(clippy::unwrap_used)]
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

#[allow(clippy::unwrap_used)]
static BASELINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)l[ií]nea\s+base|valor\s+inicial|situaci[oó]n\s+actual").unwrap()
});

/// Causal connectives splitting a statement into cause and effect.
const CAUSAL_MARKERS: [&str; 5] = [
    " para ",
    " con el fin de ",
    " mediante ",
    " a fin de ",
    " porque ",
];

/// Gap and deficit markers.
const GAP_MARKERS: [&str; 5] = ["sin ", "falta", "carencia", "déficit", "deficit"];

/// Risk markers.
const RISK_MARKERS: [&str; 4] = ["riesgo", "amenaza", "vulnerab", "contingencia"];

/// `PatternDetector::detect_patterns` - matches the task's applicable
/// patterns against the chunk text.
fn detect_patterns(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let patterns = context
        .data
        .get("patterns")
        .and_then(Value::as_array)
        .ok_or_else(|| "data has no patterns list".to_string())?;

    let lower_text = context.text.to_lowercase();
    let mut matched = Vec::new();
    let mut weight_sum = 0.0f64;
    for pattern in patterns {
        let Some(map) = pattern.as_object() else {
            continue;
        };
        let Some(text) = map
            .get("text")
            .or_else(|| map.get("pattern"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        let is_match = if map.get("match_mode").and_then(Value::as_str) == Some("regex") {
            Regex::new(text).is_ok_and(|re| re.is_match(&context.text))
        } else {
            lower_text.contains(&text.to_lowercase())
        };
        if is_match {
            weight_sum += map
                .get("weight")
                .or_else(|| map.get("confidence"))
                .and_then(Value::as_f64)
                .unwrap_or(1.0);
            matched.push(pattern.clone());
        }
    }

    let confidence = if matched.is_empty() {
        0.5
    } else {
        (weight_sum / matched.len() as f64).clamp(0.0, 1.0)
    };
    Ok(json!({
        "matches": matched.len(),
        "elements": matched,
        "confidence": confidence,
    }))
}

/// `NumericalAnalyzer::extract_claims` - numeric claims in the text.
fn extract_claims(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let claims: Vec<Value> = NUMBER_RE
        .find_iter(&context.text)
        .map(|m| json!({"value": m.as_str(), "span": [m.start(), m.end()]}))
        .collect();
    let confidence = (0.5 + 0.1 * claims.len() as f64).min(0.95);
    Ok(json!({"elements": claims, "confidence": confidence}))
}

/// `NumericalAnalyzer::identify_gaps` - sentences flagging deficits.
fn identify_gaps(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let gaps: Vec<&String> = context
        .sentences
        .iter()
        .filter(|s| {
            let lower = s.to_lowercase();
            GAP_MARKERS.iter().any(|m| lower.contains(m))
        })
        .collect();
    Ok(json!({"gaps": gaps}))
}

/// `RiskAssessor::assess_risks` - sentences flagging risks.
fn assess_risks(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let risks: Vec<&String> = context
        .sentences
        .iter()
        .filter(|s| {
            let lower = s.to_lowercase();
            RISK_MARKERS.iter().any(|m| lower.contains(m))
        })
        .collect();
    Ok(json!({"risks": risks}))
}

/// `CausalExtractor::extract_statements` - sentences carrying a causal
/// connective. Populates the context's statement list.
fn extract_statements(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let statements: Vec<String> = context
        .sentences
        .iter()
        .filter(|s| {
            let lower = s.to_lowercase();
            CAUSAL_MARKERS.iter().any(|m| lower.contains(m))
        })
        .cloned()
        .collect();
    context.statements.clone_from(&statements);
    Ok(json!({"statements": statements}))
}

/// `CausalExtractor::build_graph` - intervention/outcome graph from the
/// extracted statements. Populates the context's graph slot.
fn build_graph(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let mut graph = CausalGraph::default();
    for statement in &context.statements {
        let lower = statement.to_lowercase();
        for marker in CAUSAL_MARKERS {
            if let Some(pos) = lower.find(marker) {
                let cause = statement[..pos].trim().to_string();
                let effect = statement[pos + marker.len()..]
                    .trim()
                    .trim_end_matches('.')
                    .to_string();
                if cause.is_empty() || effect.is_empty() {
                    continue;
                }
                let from = node_index(&mut graph, cause);
                let to = node_index(&mut graph, effect);
                if from != to && !graph.edges.contains(&(from, to)) {
                    graph.edges.push((from, to));
                }
                break;
            }
        }
    }
    let summary = json!({"nodes": graph.nodes.len(), "edges": graph.edges.len()});
    context.graph = Some(graph);
    Ok(summary)
}

fn node_index(graph: &mut CausalGraph, label: String) -> usize {
    graph.nodes.iter().position(|n| *n == label).unwrap_or_else(|| {
        graph.nodes.push(label);
        graph.nodes.len() - 1
    })
}

/// `DagValidator::trace_paths` - source-to-sink path count.
fn trace_paths(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let graph = context.graph.as_ref().ok_or_else(|| "no causal graph".to_string())?;
    Ok(json!({"paths": graph.path_count()}))
}

/// `DagValidator::validate_acyclic` - cycle check over the causal graph.
fn validate_acyclic(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let graph = context.graph.as_ref().ok_or_else(|| "no causal graph".to_string())?;
    // A graph where every node has an incoming edge must contain a cycle
    let acyclic = graph.nodes.is_empty()
        || (0..graph.nodes.len()).any(|i| !graph.edges.iter().any(|(_, to)| *to == i));
    Ok(json!({"acyclic": acyclic}))
}

/// `CoherenceAnalyzer::count_contradictions` - negated restatements of
/// an earlier sentence's content word.
fn count_contradictions(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let mut contradictions = 0u64;
    for (i, a) in context.sentences.iter().enumerate() {
        let a_lower = a.to_lowercase();
        if !a_lower.contains(" no ") {
            continue;
        }
        let keywords: Vec<&str> = a_lower
            .split_whitespace()
            .filter(|w| w.len() >= 6)
            .collect();
        let contradicts = context.sentences.iter().take(i).any(|b| {
            let b_lower = b.to_lowercase();
            !b_lower.contains(" no ") && keywords.iter().any(|k| b_lower.contains(k))
        });
        if contradicts {
            contradictions += 1;
        }
    }
    Ok(json!({"contradictions": contradictions}))
}

/// `BaselineDetector::detect_baselines` - baseline markers and years.
fn detect_baselines(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let mut elements: Vec<Value> = BASELINE_RE
        .find_iter(&context.text)
        .map(|m| json!({"marker": m.as_str(), "span": [m.start(), m.end()]}))
        .collect();
    for m in YEAR_RE.find_iter(&context.text) {
        elements.push(json!({"year": m.as_str(), "span": [m.start(), m.end()]}));
    }
    Ok(json!({"matches": elements.len(), "elements": elements}))
}

/// `FinancialAnalyzer::trace_budget` - fraction of budget rows whose
/// amounts reconcile, plus the rows as evidence elements.
fn trace_budget(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let budget_rows: Vec<&Value> = context
        .tables
        .iter()
        .filter(|t| t.get("amount").is_some())
        .collect();
    if budget_rows.is_empty() {
        // No budget tables: tracing falls back to in-text currency mentions
        let mentions = NUMBER_RE
            .find_iter(&context.text)
            .filter(|m| m.as_str().contains('.') || m.as_str().to_lowercase().contains("cop"))
            .count();
        let ratio = if mentions > 0 { 0.5 } else { 0.0 };
        return Ok(json!({"traced_ratio": ratio, "elements": []}));
    }
    let traced = budget_rows
        .iter()
        .filter(|row| {
            row.get("imbalance")
                .and_then(Value::as_f64)
                .is_some_and(|i| i <= 0.05)
        })
        .count();
    let ratio = traced as f64 / budget_rows.len() as f64;
    let elements: Vec<Value> = budget_rows.into_iter().cloned().collect();
    Ok(json!({"traced_ratio": ratio, "elements": elements}))
}

/// `MechanismInferencer::assess_plausibility` - mechanism plausibility
/// from graph connectivity and statement support.
fn assess_plausibility(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let graph = context.graph.as_ref().ok_or_else(|| "no causal graph".to_string())?;
    let nodes = graph.nodes.len() as f64;
    let edges = graph.edges.len() as f64;
    let density = if nodes > 1.0 { (edges / nodes).min(1.0) } else { 0.0 };
    let support = (context.statements.len() as f64 * 0.05).min(0.3);
    let plausibility = (0.2 + 0.5 * density + support).clamp(0.0, 1.0);
    Ok(json!({"plausibility": plausibility}))
}

/// `EvidentialTester::hoop_test` - a necessary condition: at least one
/// applicable pattern must appear in the text.
fn hoop_test(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let result = detect_patterns(context)?;
    let passed = result.get("matches").and_then(Value::as_u64).unwrap_or(0) > 0;
    Ok(json!({"hoop_passed": passed}))
}

/// `EvidentialTester::smoking_gun_test` - a sufficient condition: a
/// high-weight pattern appears together with a numeric claim.
fn smoking_gun_test(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let patterns = detect_patterns(context)?;
    let strong = patterns
        .get("elements")
        .and_then(Value::as_array)
        .is_some_and(|items| {
            items.iter().any(|p| {
                p.get("weight").and_then(Value::as_f64).unwrap_or(0.0) >= 0.8
            })
        });
    let has_number = NUMBER_RE.is_match(&context.text);
    Ok(json!({"smoking_gun": strong && has_number}))
}

/// `ConfidenceAggregator::aggregate` - final confidence from the prior
/// outputs recorded in the context.
fn aggregate_confidence(context: &mut ArgumentContext) -> std::result::Result<Value, String> {
    let mut confidence: f64 = 0.5;
    if let Some(patterns) = context.outputs.get("PatternDetector::detect_patterns") {
        if let Some(c) = patterns.get("confidence").and_then(Value::as_f64) {
            confidence = confidence.max(c);
        }
        if patterns.get("matches").and_then(Value::as_u64).unwrap_or(0) > 0 {
            confidence += 0.1;
        }
    }
    if let Some(claims) = context.outputs.get("NumericalAnalyzer::extract_claims") {
        if let Some(c) = claims.get("confidence").and_then(Value::as_f64) {
            confidence = confidence.max(c);
        }
    }
    if let Some(hoop) = context.outputs.get("EvidentialTester::hoop_test") {
        if hoop.get("hoop_passed") == Some(&Value::Bool(true)) {
            confidence += 0.05;
        }
    }
    Ok(json!({"confidence": confidence.clamp(0.0, 1.0)}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with_text(text: &str) -> ArgumentContext {
        let chunk = crate::graph::Chunk::new(
            "PA01-DIM01",
            text,
            crate::graph::Resolution::Meso,
            crate::graph::TextSpan::new(0, text.len() as u64),
        );
        ArgumentContext::for_chunk(
            &chunk,
            json!({"patterns": [
                {"text": "presupuesto", "weight": 0.9},
                {"text": "inexistente", "weight": 0.5},
            ]}),
        )
    }

    #[test]
    fn test_registry_known_and_unknown() {
        assert!(method_entry("PatternDetector", "detect_patterns").is_some());
        assert!(method_entry("DagValidator", "trace_paths").is_some());
        assert!(method_entry("PatternDetector", "no_such_method").is_none());
        assert!(method_entry("NoSuchClass", "detect_patterns").is_none());
    }

    #[test]
    fn test_detect_patterns_matches_substring() {
        let mut context =
            context_with_text("El presupuesto municipal asciende a COP 1.200.000.000");
        let result = detect_patterns(&mut context).unwrap();
        assert_eq!(result["matches"], json!(1));
        assert!((result["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_detect_patterns_no_patterns_key() {
        let mut context = ArgumentContext {
            data: json!({}),
            ..ArgumentContext::default()
        };
        assert!(detect_patterns(&mut context).is_err());
    }

    #[test]
    fn test_extract_claims_finds_numbers() {
        let mut context =
            context_with_text("Reducir la desnutrición 10% con COP 1.200.000.000 en 2024.");
        let result = extract_claims(&mut context).unwrap();
        let elements = result["elements"].as_array().unwrap();
        assert!(elements.len() >= 2);
    }

    #[test]
    fn test_extract_statements_and_build_graph() {
        let mut context = context_with_text(
            "Construir comedores escolares para reducir la desnutrición infantil. \
             Ampliar cobertura mediante brigadas moviles.",
        );
        let statements = extract_statements(&mut context).unwrap();
        assert_eq!(statements["statements"].as_array().unwrap().len(), 2);

        let summary = build_graph(&mut context).unwrap();
        assert!(summary["nodes"].as_u64().unwrap() >= 2);
        assert!(summary["edges"].as_u64().unwrap() >= 1);
        assert!(context.graph.is_some());
    }

    #[test]
    fn test_trace_paths_requires_graph() {
        let mut context = ArgumentContext::default();
        assert!(trace_paths(&mut context).is_err());
    }

    #[test]
    fn test_trace_paths_linear() {
        let mut context = ArgumentContext::default();
        context.graph = Some(CausalGraph {
            nodes: vec!["a".into(), "b".into()],
            edges: vec![(0, 1)],
        });
        let result = trace_paths(&mut context).unwrap();
        assert_eq!(result["paths"], json!(1));
    }

    #[test]
    fn test_count_contradictions() {
        let mut context = ArgumentContext {
            sentences: vec![
                "El municipio ampliara la cobertura educativa.".to_string(),
                "El plan no contempla la cobertura educativa.".to_string(),
            ],
            ..ArgumentContext::default()
        };
        let result = count_contradictions(&mut context).unwrap();
        assert_eq!(result["contradictions"], json!(1));
    }

    #[test]
    fn test_count_contradictions_clean_text() {
        let mut context = ArgumentContext {
            sentences: vec![
                "Primera meta clara.".to_string(),
                "Segunda meta coherente.".to_string(),
            ],
            ..ArgumentContext::default()
        };
        let result = count_contradictions(&mut context).unwrap();
        assert_eq!(result["contradictions"], json!(0));
    }

    #[test]
    fn test_detect_baselines() {
        let mut context =
            context_with_text("Línea base 2023: cobertura del 40%. Meta 2027: 80%.");
        let result = detect_baselines(&mut context).unwrap();
        assert!(result["matches"].as_u64().unwrap() >= 2);
    }

    #[test]
    fn test_trace_budget_with_rows() {
        let mut context = ArgumentContext {
            tables: vec![
                json!({"label": "educacion", "amount": 100.0, "imbalance": 0.0}),
                json!({"label": "salud", "amount": 50.0, "imbalance": 0.2}),
            ],
            ..ArgumentContext::default()
        };
        let result = trace_budget(&mut context).unwrap();
        assert!((result["traced_ratio"].as_f64().unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(result["elements"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_trace_budget_without_rows() {
        let mut context = context_with_text("Inversión de COP 1.200.000.000 prevista.");
        let result = trace_budget(&mut context).unwrap();
        assert!((result["traced_ratio"].as_f64().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hoop_test() {
        let mut context = context_with_text("El presupuesto está asignado.");
        let result = hoop_test(&mut context).unwrap();
        assert_eq!(result["hoop_passed"], json!(true));

        let mut context = context_with_text("Texto sin coincidencias.");
        let result = hoop_test(&mut context).unwrap();
        assert_eq!(result["hoop_passed"], json!(false));
    }

    #[test]
    fn test_aggregate_confidence_uses_outputs() {
        let mut context = ArgumentContext::default();
        context.outputs.insert(
            "PatternDetector::detect_patterns".to_string(),
            json!({"matches": 2, "confidence": 0.8}),
        );
        let result = aggregate_confidence(&mut context).unwrap();
        assert!((result["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_methods_are_deterministic() {
        let text = "Construir acueducto para mejorar salud. Línea base 2023 del 40%.";
        let mut a = context_with_text(text);
        let mut b = context_with_text(text);
        assert_eq!(extract_claims(&mut a).unwrap(), extract_claims(&mut b).unwrap());
        assert_eq!(
            detect_baselines(&mut a).unwrap(),
            detect_baselines(&mut b).unwrap()
        );
    }
}
