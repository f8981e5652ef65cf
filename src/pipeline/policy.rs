//! Policy-aware structural normalization (Phase 3).
//!
//! Detects the hierarchical plan structure Ejes -> Programas ->
//! Proyectos -> Metas -> Indicadores over the normalized page text and
//! emits a preliminary policy graph labelling byte ranges with their
//! structural role. Every detected unit has a non-empty byte range and a
//! parent, except Ejes at the root.

use crate::error::{IngestError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Structural role of a policy unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRole {
    /// Strategic axis (root level).
    Eje,
    /// Programa.
    Programa,
    /// Proyecto.
    Proyecto,
    /// Meta.
    Meta,
    /// Indicador.
    Indicador,
}

impl PolicyRole {
    /// Hierarchy depth, Eje = 0.
    #[must_use]
    pub const fn depth(self) -> u8 {
        match self {
            Self::Eje => 0,
            Self::Programa => 1,
            Self::Proyecto => 2,
            Self::Meta => 3,
            Self::Indicador => 4,
        }
    }
}

/// One detected policy unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyUnit {
    /// Stable unit id (`eje-0`, `programa-1`, ...).
    pub id: String,
    /// Structural role.
    pub role: PolicyRole,
    /// Heading text of the unit.
    pub label: String,
    /// Byte range in the normalized content stream this unit governs.
    pub byte_range: (u64, u64),
    /// Parent unit id; `None` only for Ejes.
    pub parent: Option<String>,
}

/// The preliminary policy graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyGraph {
    /// Units in document order.
    pub units: Vec<PolicyUnit>,
    /// Whether the root Eje was synthesized because none was detected.
    pub implicit_root: bool,
}

impl PolicyGraph {
    /// Units of one role, in document order.
    pub fn units_of(&self, role: PolicyRole) -> impl Iterator<Item = &PolicyUnit> {
        self.units.iter().filter(move |u| u.role == role)
    }

    /// Fraction of units satisfying the parent invariant, for the
    /// structural-consistency metric.
    #[must_use]
    pub fn parent_consistency(&self) -> f64 {
        if self.units.is_empty() {
            return 1.0;
        }
        let consistent = self
            .units
            .iter()
            .filter(|u| u.role == PolicyRole::Eje || u.parent.is_some())
            .count();
        consistent as f64 / self.units.len() as f64
    }
}

static HEADING_RES: LazyLock<[(PolicyRole, Regex); 5]> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let build = |pattern: &str| Regex::new(pattern).unwrap();
    [
        (
            PolicyRole::Eje,
            build(r"(?im)^\s*(eje(\s+estrat[eé]gico)?|l[ií]nea\s+estrat[eé]gica|dimensi[oó]n)\b[^\n]*"),
        ),
        (PolicyRole::Programa, build(r"(?im)^\s*programa\b[^\n]*")),
        (PolicyRole::Proyecto, build(r"(?im)^\s*proyecto\b[^\n]*")),
        (PolicyRole::Meta, build(r"(?im)^\s*meta\b[^\n]*")),
        (PolicyRole::Indicador, build(r"(?im)^\s*indicador\b[^\n]*")),
    ]
});

/// Detects the policy structure over the normalized stream text.
///
/// # Errors
///
/// Returns a Phase 3 failure if a detected unit ends up with an empty
/// byte range (a heading at the very end of the document).
pub fn detect_policy_structure(text: &str) -> Result<PolicyGraph> {
    // Collect headings in document order
    let mut headings: Vec<(usize, PolicyRole, String)> = Vec::new();
    for (role, regex) in HEADING_RES.iter() {
        for m in regex.find_iter(text) {
            headings.push((m.start(), *role, m.as_str().trim().to_string()));
        }
    }
    headings.sort_by_key(|(start, role, _)| (*start, role.depth()));
    // A heading line matches at most one role at a given offset; when the
    // Eje regex and another both anchor at the same line start the
    // shallower role wins.
    headings.dedup_by_key(|(start, _, _)| *start);

    let mut graph = PolicyGraph::default();
    // Bytes before the first detected Eje (or the whole document when no
    // Eje exists) get a synthetic governing Eje so every byte and every
    // non-Eje unit has a root. It ends where the first real Eje starts,
    // keeping Eje ranges disjoint.
    let first_eje_start = headings
        .iter()
        .find(|(_, role, _)| *role == PolicyRole::Eje)
        .map_or(text.len(), |(start, _, _)| *start);
    if first_eje_start > 0 && !text.is_empty() {
        graph.units.push(PolicyUnit {
            id: "eje-0".to_string(),
            role: PolicyRole::Eje,
            label: "Documento".to_string(),
            byte_range: (0, first_eje_start as u64),
            parent: None,
        });
        graph.implicit_root = true;
    }

    let mut counters = [0usize; 5];
    // Most recent unit index per depth, for parent resolution
    let mut latest_at_depth: [Option<usize>; 5] = [None; 5];
    if graph.implicit_root {
        latest_at_depth[0] = Some(0);
        counters[0] = 1;
    }

    let ends: Vec<usize> = headings
        .iter()
        .enumerate()
        .map(|(i, (start, role, _))| {
            // A unit's range runs to the next heading at the same or a
            // shallower depth, or to the end of the document.
            headings
                .iter()
                .skip(i + 1)
                .find(|(_, next_role, _)| next_role.depth() <= role.depth())
                .map_or(text.len(), |(next_start, _, _)| *next_start)
        })
        .collect();

    for ((start, role, label), end) in headings.into_iter().zip(ends) {
        let depth = usize::from(role.depth());
        let parent = if role == PolicyRole::Eje {
            None
        } else {
            // Nearest ancestor: walk up until a populated depth
            (0..depth)
                .rev()
                .find_map(|d| latest_at_depth[d])
                .map(|i| graph.units[i].id.clone())
                .or_else(|| graph.units.first().map(|u| u.id.clone()))
        };

        if end <= start {
            return Err(IngestError::PhaseFailed {
                phase: "Phase 3",
                reason: format!("policy unit {label:?} has empty byte range at offset {start}"),
            }
            .into());
        }

        let id = format!("{}-{}", role_tag(role), counters[depth]);
        counters[depth] += 1;
        graph.units.push(PolicyUnit {
            id,
            role,
            label,
            byte_range: (start as u64, end as u64),
            parent,
        });
        let index = graph.units.len() - 1;
        latest_at_depth[depth] = Some(index);
        // Entering a new unit invalidates deeper ancestors
        for slot in latest_at_depth.iter_mut().skip(depth + 1) {
            *slot = None;
        }
    }

    Ok(graph)
}

const fn role_tag(role: PolicyRole) -> &'static str {
    match role {
        PolicyRole::Eje => "eje",
        PolicyRole::Programa => "programa",
        PolicyRole::Proyecto => "proyecto",
        PolicyRole::Meta => "meta",
        PolicyRole::Indicador => "indicador",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
Eje estratégico 1: Desarrollo social incluyente
Programa de seguridad alimentaria
Meta: reducir desnutrición 10%
Indicador: tasa de desnutrición infantil
Programa de salud rural
Eje estratégico 2: Infraestructura para la paz
Proyecto de vías terciarias
";

    #[test]
    fn test_detects_hierarchy() {
        let graph = detect_policy_structure(PLAN).unwrap();
        assert!(!graph.implicit_root);
        assert_eq!(graph.units_of(PolicyRole::Eje).count(), 2);
        assert_eq!(graph.units_of(PolicyRole::Programa).count(), 2);
        assert_eq!(graph.units_of(PolicyRole::Meta).count(), 1);
        assert_eq!(graph.units_of(PolicyRole::Indicador).count(), 1);
        assert_eq!(graph.units_of(PolicyRole::Proyecto).count(), 1);
    }

    #[test]
    fn test_parents_resolved() {
        let graph = detect_policy_structure(PLAN).unwrap();
        let meta = graph.units_of(PolicyRole::Meta).next().unwrap();
        assert_eq!(meta.parent.as_deref(), Some("programa-0"));
        let proyecto = graph.units_of(PolicyRole::Proyecto).next().unwrap();
        assert_eq!(proyecto.parent.as_deref(), Some("eje-1"));
        for eje in graph.units_of(PolicyRole::Eje) {
            assert!(eje.parent.is_none());
        }
        assert!((graph.parent_consistency() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ranges_nest() {
        let graph = detect_policy_structure(PLAN).unwrap();
        let eje1 = graph.units_of(PolicyRole::Eje).next().unwrap();
        let programa = graph.units_of(PolicyRole::Programa).next().unwrap();
        assert!(programa.byte_range.0 >= eje1.byte_range.0);
        assert!(programa.byte_range.1 <= eje1.byte_range.1);
    }

    #[test]
    fn test_eje_range_ends_at_next_eje() {
        let graph = detect_policy_structure(PLAN).unwrap();
        let ejes: Vec<&PolicyUnit> = graph.units_of(PolicyRole::Eje).collect();
        assert_eq!(ejes[0].byte_range.1, ejes[1].byte_range.0);
        assert_eq!(ejes[1].byte_range.1, PLAN.len() as u64);
    }

    #[test]
    fn test_unstructured_document_gets_implicit_root() {
        let graph = detect_policy_structure("texto sin estructura alguna").unwrap();
        assert!(graph.implicit_root);
        assert_eq!(graph.units.len(), 1);
        assert_eq!(graph.units[0].role, PolicyRole::Eje);
        assert_eq!(graph.units[0].byte_range, (0, 27));
    }

    #[test]
    fn test_leading_content_before_first_eje() {
        let text = format!("Presentación del alcalde.\n{PLAN}");
        let graph = detect_policy_structure(&text).unwrap();
        // Leading prose forces the implicit root, keeping all bytes governed
        assert!(graph.implicit_root);
        let detected_ejes = graph.units_of(PolicyRole::Eje).count();
        assert_eq!(detected_ejes, 3); // implicit + 2 detected
    }

    #[test]
    fn test_deterministic() {
        let a = detect_policy_structure(PLAN).unwrap();
        let b = detect_policy_structure(PLAN).unwrap();
        assert_eq!(a, b);
    }
}
