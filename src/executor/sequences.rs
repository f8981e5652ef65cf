//! Declarative method sequences for the 30 base slots.
//!
//! Each slot maps to an ordered list of (class, method) references.
//! Every sequence runs the shared analysis battery so evidence always
//! carries the universal keys, then adds the dimension's focus methods
//! and a per-question evidential test.

use crate::error::{ExecutorError, Result};
use crate::ids::BaseSlot;

/// One method reference in a sequence, with an optional declared
/// fallback tried when the method itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRef {
    /// Class name in the analysis library.
    pub class: &'static str,
    /// Method name.
    pub method: &'static str,
    /// Fallback (class, method), tried on failure.
    pub fallback: Option<(&'static str, &'static str)>,
}

impl MethodRef {
    const fn new(class: &'static str, method: &'static str) -> Self {
        Self {
            class,
            method,
            fallback: None,
        }
    }

    const fn with_fallback(
        class: &'static str,
        method: &'static str,
        fallback: (&'static str, &'static str),
    ) -> Self {
        Self {
            class,
            method,
            fallback: Some(fallback),
        }
    }
}

/// Returns the declared method sequence for a base slot.
///
/// # Errors
///
/// Returns [`ExecutorError::UnknownSlot`] for a slot outside the 30
/// declared ones (unreachable with a typed [`BaseSlot`], kept for the
/// dispatch contract).
pub fn sequence_for(slot: BaseSlot) -> Result<Vec<MethodRef>> {
    let dimension = slot.dimension().index();
    let question = slot.question();

    let mut sequence = vec![
        MethodRef::new("PatternDetector", "detect_patterns"),
        MethodRef::new("NumericalAnalyzer", "extract_claims"),
        MethodRef::new("CausalExtractor", "extract_statements"),
        MethodRef::new("CausalExtractor", "build_graph"),
        MethodRef::new("DagValidator", "trace_paths"),
        MethodRef::new("CoherenceAnalyzer", "count_contradictions"),
        MethodRef::new("BaselineDetector", "detect_baselines"),
        MethodRef::new("FinancialAnalyzer", "trace_budget"),
        MethodRef::new("MechanismInferencer", "assess_plausibility"),
    ];

    // Dimension focus
    match dimension {
        1 => {
            sequence.push(MethodRef::new("NumericalAnalyzer", "identify_gaps"));
            sequence.push(MethodRef::new("RiskAssessor", "assess_risks"));
        }
        2 | 5 => sequence.push(MethodRef::new("EvidentialTester", "hoop_test")),
        3 => sequence.push(MethodRef::with_fallback(
            "EvidentialTester",
            "smoking_gun_test",
            ("EvidentialTester", "hoop_test"),
        )),
        4 => sequence.push(MethodRef::new("DagValidator", "validate_acyclic")),
        6 => sequence.push(MethodRef::with_fallback(
            "EvidentialTester",
            "smoking_gun_test",
            ("EvidentialTester", "hoop_test"),
        )),
        _ => {
            return Err(ExecutorError::UnknownSlot {
                slot: slot.to_string(),
            }
            .into());
        }
    }

    // Per-question evidential variation
    match question {
        2 => sequence.push(MethodRef::new("NumericalAnalyzer", "identify_gaps")),
        3 => sequence.push(MethodRef::new("RiskAssessor", "assess_risks")),
        4 => sequence.push(MethodRef::new("EvidentialTester", "hoop_test")),
        5 => sequence.push(MethodRef::with_fallback(
            "EvidentialTester",
            "smoking_gun_test",
            ("EvidentialTester", "hoop_test"),
        )),
        _ => {}
    }

    sequence.push(MethodRef::new("ConfidenceAggregator", "aggregate"));
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::methods::method_entry;

    #[test]
    fn test_all_30_slots_have_sequences() {
        for slot in BaseSlot::all() {
            let sequence = sequence_for(slot).unwrap();
            assert!(sequence.len() >= 10, "slot {slot} too short");
        }
    }

    #[test]
    fn test_every_declared_method_is_registered() {
        for slot in BaseSlot::all() {
            for method_ref in sequence_for(slot).unwrap() {
                assert!(
                    method_entry(method_ref.class, method_ref.method).is_some(),
                    "{}::{} not registered",
                    method_ref.class,
                    method_ref.method
                );
                if let Some((class, method)) = method_ref.fallback {
                    assert!(
                        method_entry(class, method).is_some(),
                        "fallback {class}::{method} not registered"
                    );
                }
            }
        }
    }

    #[test]
    fn test_graph_produced_before_consumed() {
        for slot in BaseSlot::all() {
            let sequence = sequence_for(slot).unwrap();
            let build_at = sequence
                .iter()
                .position(|m| m.method == "build_graph")
                .unwrap();
            for (i, method_ref) in sequence.iter().enumerate() {
                if matches!(method_ref.method, "trace_paths" | "validate_acyclic" | "assess_plausibility") {
                    assert!(i > build_at, "slot {slot}: {} before build_graph", method_ref.method);
                }
            }
        }
    }

    #[test]
    fn test_aggregate_is_last() {
        for slot in BaseSlot::all() {
            let sequence = sequence_for(slot).unwrap();
            let last = sequence.last().unwrap();
            assert_eq!(last.class, "ConfidenceAggregator");
            assert_eq!(last.method, "aggregate");
        }
    }

    #[test]
    fn test_dimension_focus_varies() {
        let d1 = sequence_for(BaseSlot::new(1, 1).unwrap()).unwrap();
        let d3 = sequence_for(BaseSlot::new(3, 1).unwrap()).unwrap();
        assert_ne!(d1, d3);
        assert!(d1.iter().any(|m| m.method == "identify_gaps"));
        assert!(d3.iter().any(|m| m.method == "smoking_gun_test"));
    }

    #[test]
    fn test_question_variation() {
        let q1 = sequence_for(BaseSlot::new(2, 1).unwrap()).unwrap();
        let q5 = sequence_for(BaseSlot::new(2, 5).unwrap()).unwrap();
        assert!(q5.len() > q1.len());
    }

    #[test]
    fn test_smoking_gun_declares_fallback() {
        let d6 = sequence_for(BaseSlot::new(6, 1).unwrap()).unwrap();
        let smoking_gun = d6
            .iter()
            .find(|m| m.method == "smoking_gun_test")
            .unwrap();
        assert_eq!(smoking_gun.fallback, Some(("EvidentialTester", "hoop_test")));
    }
}
