//! The nine-phase CPP ingestion pipeline.
//!
//! Phases run strictly in order; each checks its postcondition and any
//! failure aborts the run with a diagnostic naming the phase. The only
//! I/O happens in Phase 1 (document read); Phase 9 hands the assembled
//! package back to the orchestrator, which owns the artifact write.

pub mod chunker;
pub mod policy;
pub mod tables;

use crate::config::PipelineConfig;
use crate::content::store::DeclaredMetadata;
use crate::content::stream::{BoundingBox, ContentStream, PageRow, ProvenanceMap, TokenBinding};
use crate::content::{SourceManifest, acquire};
use crate::cpp::{CPP_SCHEMA_VERSION, CanonPolicyPackage, CppManifest, PolicyManifest};
use crate::error::{IngestError, Result};
use crate::io::unicode::{nfc_normalize, token_spans};
use crate::parser::{AdapterRegistry, RawDocument};
use crate::pipeline::chunker::{ChunkingOutcome, chunk_document};
use crate::pipeline::policy::{PolicyGraph, PolicyRole, detect_policy_structure};
use crate::pipeline::tables::{TableEvidence, extract_table_evidence};
use crate::quality::QualityMetrics;
use crate::run::CancelToken;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::info;

/// Inputs identifying one ingestion run.
#[derive(Debug, Clone)]
pub struct RunIdentity {
    /// Policy unit the document belongs to.
    pub policy_unit_id: String,
    /// Run correlation id.
    pub correlation_id: String,
}

/// Derives the tie-breaking seed from `(base_seed, policy_unit_id,
/// correlation_id)`.
#[must_use]
pub fn derive_seed(base_seed: u64, policy_unit_id: &str, correlation_id: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&base_seed.to_le_bytes());
    hasher.update(policy_unit_id.as_bytes());
    hasher.update(correlation_id.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Runs Phases 1 through 9 and returns the packed CPP.
///
/// # Errors
///
/// Returns a typed ABORT diagnostic naming the failing phase or gate.
pub fn run_ingestion<P: AsRef<Path>>(
    document: P,
    declared: &DeclaredMetadata,
    adapters: &AdapterRegistry,
    config: &PipelineConfig,
    identity: &RunIdentity,
    cancel: &CancelToken,
) -> Result<CanonPolicyPackage> {
    // Phase 1: acquisition & integrity
    cancel.check("Phase 1")?;
    let (bytes, source) = acquire(document, declared)?;
    info!(hash = %source.source_hash, mime = %source.mime, bytes = source.byte_count, "Phase 1 complete");

    // Phase 2: format decomposition
    cancel.check("Phase 2")?;
    let adapter = adapters.resolve(&source.mime)?;
    let raw = adapter.decompose(&bytes, &source)?;
    check_phase2(&raw)?;
    info!(parser = %raw.parser_id, pages = raw.pages.len(), "Phase 2 complete");

    // Phase 3: policy-aware structural normalization.
    // Structure detection runs over the same NFC text the content stream
    // will carry, so unit byte ranges are stream offsets from the start.
    let normalized_pages: Vec<String> =
        raw.pages.iter().map(|p| nfc_normalize(&p.text)).collect();
    let full_text = normalized_pages.concat();
    let policy = detect_policy_structure(&full_text)?;
    check_phase3(&policy)?;
    info!(units = policy.units.len(), "Phase 3 complete");

    // Phase 4: text extraction & normalization
    let stream = build_stream(&raw, &normalized_pages);
    if let Some(reason) = stream.check_monotone() {
        return Err(IngestError::PhaseFailed {
            phase: "Phase 4",
            reason,
        }
        .into());
    }
    info!(pages = stream.rows.len(), bytes = stream.total_len(), "Phase 4 complete");

    // Phase 5: conditional OCR
    let ocr_ran = ocr_triggered(&raw, &stream, config);
    let provenance = bind_provenance(&raw, &stream, ocr_ran, config)?;
    if ocr_ran {
        info!(tokens = provenance.tokens.len(), "Phase 5 complete (OCR layer accepted)");
    }

    // Phase 6: tables & budget handling
    let mut tables = TableEvidence::default();
    for (page, row) in raw.pages.iter().zip(&stream.rows) {
        let page_evidence = extract_table_evidence(
            &page.table_candidates,
            usize::try_from(row.byte_start).unwrap_or(0),
            config.ingest.budget_tolerance,
        )?;
        tables.kpis.extend(page_evidence.kpis);
        tables.budgets.extend(page_evidence.budgets);
    }
    info!(kpis = tables.kpis.len(), budgets = tables.budgets.len(), "Phase 6 complete");

    // Phase 7: provenance binding
    let completeness = provenance.completeness();
    if (completeness - 1.0).abs() > f64::EPSILON {
        return Err(IngestError::PhaseFailed {
            phase: "Phase 7",
            reason: format!("provenance_completeness {completeness} != 1.0"),
        }
        .into());
    }
    info!(tokens = provenance.tokens.len(), "Phase 7 complete");

    // Phase 8: advanced chunking
    cancel.check("Phase 8")?;
    let seed = derive_seed(config.seed, &identity.policy_unit_id, &identity.correlation_id);
    let outcome = chunk_document(
        &full_text,
        &policy,
        &tables,
        &provenance,
        &config.ingest,
        seed,
    )?;
    let violations = outcome.graph.validate();
    if let Some(violation) = violations.first() {
        return Err(IngestError::PhaseFailed {
            phase: "Phase 8",
            reason: violation.clone(),
        }
        .into());
    }
    info!(chunks = outcome.graph.len(), "Phase 8 complete");

    // Phase 9: canonical packing
    cancel.check("Phase 9")?;
    let package = pack(source, stream, provenance, outcome, &policy, &full_text, identity, config)?;
    info!(merkle_root = %package.integrity.merkle_root, "Phase 9 complete");
    Ok(package)
}

/// Phase 2 postcondition: at least one page, numeric ids, non-empty
/// source ranges.
fn check_phase2(raw: &RawDocument) -> Result<()> {
    if raw.pages.is_empty() {
        return Err(IngestError::EmptyDocument {
            parser_id: raw.parser_id.clone(),
        }
        .into());
    }
    for page in &raw.pages {
        if page.source_byte_range.1 <= page.source_byte_range.0 {
            return Err(IngestError::PhaseFailed {
                phase: "Phase 2",
                reason: format!("page {} has an empty source byte range", page.page_id),
            }
            .into());
        }
    }
    Ok(())
}

/// Phase 3 postcondition: non-empty ranges, parents except Ejes.
fn check_phase3(policy: &PolicyGraph) -> Result<()> {
    for unit in &policy.units {
        if unit.byte_range.1 <= unit.byte_range.0 {
            return Err(IngestError::PhaseFailed {
                phase: "Phase 3",
                reason: format!("policy unit {} has an empty byte range", unit.id),
            }
            .into());
        }
        if unit.role != PolicyRole::Eje && unit.parent.is_none() {
            return Err(IngestError::PhaseFailed {
                phase: "Phase 3",
                reason: format!("policy unit {} has no parent", unit.id),
            }
            .into());
        }
    }
    Ok(())
}

/// Builds the content stream from normalized page text.
fn build_stream(raw: &RawDocument, normalized_pages: &[String]) -> ContentStream {
    let mut rows = Vec::with_capacity(raw.pages.len());
    let mut offset: i64 = 0;
    for (page, text) in raw.pages.iter().zip(normalized_pages) {
        let end = offset + text.len() as i64;
        rows.push(PageRow {
            page_id: page.page_id,
            text: text.clone(),
            byte_start: offset,
            byte_end: end,
        });
        offset = end;
    }
    ContentStream { rows }
}

/// Whether the conditional OCR phase triggers.
fn ocr_triggered(raw: &RawDocument, stream: &ContentStream, config: &PipelineConfig) -> bool {
    let low_layout = raw
        .pages
        .iter()
        .any(|p| p.layout_confidence < config.ingest.ocr_trigger_layout_confidence);
    let density = stream.total_len() as f64 / raw.pages.len().max(1) as f64;
    low_layout || density < 40.0
}

/// Phases 4/5/7: tokenizes every page and binds each token to
/// (page, bbox, byte range, parser). When the OCR layer ran, token
/// confidences are checked against the acceptance floor.
fn bind_provenance(
    raw: &RawDocument,
    stream: &ContentStream,
    ocr_ran: bool,
    config: &PipelineConfig,
) -> Result<ProvenanceMap> {
    let mut tokens = Vec::new();
    for (page, row) in raw.pages.iter().zip(&stream.rows) {
        for (ordinal, (start, end)) in token_spans(&row.text).into_iter().enumerate() {
            let token_id = format!("p{}-t{ordinal}", page.page_id);
            // Native text carries full confidence; an OCR layer would
            // surface per-token confidences through the adapter.
            let confidence = page.layout_confidence.min(1.0);
            if ocr_ran && confidence < config.ingest.ocr_confidence_threshold {
                return Err(IngestError::OcrBelowThreshold {
                    token_id,
                    confidence,
                    threshold: config.ingest.ocr_confidence_threshold,
                }
                .into());
            }
            let bbox = page
                .layout_boxes
                .iter()
                .find(|b| b.byte_range.0 <= start && start < b.byte_range.1)
                .map_or(BoundingBox::EMPTY, |b| b.bbox);
            tokens.push(TokenBinding {
                token_id,
                page_id: page.page_id,
                bbox,
                byte_start: row.byte_start + start as i64,
                byte_end: row.byte_start + end as i64,
                parser_id: raw.parser_id.clone(),
                confidence,
            });
        }
    }
    Ok(ProvenanceMap { tokens })
}

#[allow(clippy::unwrap_used)]
static YEARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

#[allow(clippy::unwrap_used)]
static TERRITORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(municipio|departamento)\s+de\s+([A-ZÁÉÍÓÚÑ][\wáéíóúñ]*)").unwrap()
});

/// Phase 9: assembles and integrity-checks the package.
#[allow(clippy::too_many_arguments)]
fn pack(
    source: SourceManifest,
    stream: ContentStream,
    provenance: ProvenanceMap,
    outcome: ChunkingOutcome,
    policy: &PolicyGraph,
    full_text: &str,
    identity: &RunIdentity,
    config: &PipelineConfig,
) -> Result<CanonPolicyPackage> {
    // Parallel hash verification, reassembled by id order (the collect
    // preserves the sorted input order, never arrival order)
    let chunks: Vec<_> = outcome.graph.chunks().collect();
    let mismatches: Vec<String> = chunks
        .par_iter()
        .filter(|c| blake3::hash(c.text.as_bytes()).to_hex().to_string() != c.content_hash)
        .map(|c| c.id.clone())
        .collect();
    if let Some(chunk_id) = mismatches.first() {
        return Err(IngestError::PackFailed {
            artifact: "integrity.json",
            reason: format!("chunk {chunk_id} hash does not match its text"),
        }
        .into());
    }

    let metrics = QualityMetrics {
        provenance_completeness: provenance.completeness(),
        structural_consistency: outcome
            .graph
            .structural_consistency()
            .min(policy.parent_consistency()),
        kpi_linkage_rate: outcome.kpi_linkage_rate,
        budget_consistency_score: outcome.budget_consistency_score,
        boundary_f1: outcome.boundary_f1,
        chunk_overlap: outcome.chunk_overlap,
    };
    config.ingest.gates.enforce(&metrics)?;

    let mut years: Vec<i32> = YEARS_RE
        .find_iter(full_text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    years.sort_unstable();
    years.dedup();
    let mut territories: Vec<String> = TERRITORY_RE
        .captures_iter(full_text)
        .filter_map(|c| c.get(2).map(|m| m.as_str().to_string()))
        .collect();
    territories.sort();
    territories.dedup();

    let manifest = CppManifest {
        schema_version: CPP_SCHEMA_VERSION.to_string(),
        source,
        policy: PolicyManifest {
            ejes: policy.units_of(PolicyRole::Eje).map(|u| u.label.clone()).collect(),
            programas: policy
                .units_of(PolicyRole::Programa)
                .map(|u| u.label.clone())
                .collect(),
            proyectos: policy
                .units_of(PolicyRole::Proyecto)
                .map(|u| u.label.clone())
                .collect(),
            years,
            territories,
        },
        quality: metrics,
        metadata: BTreeMap::from([
            (
                "policy_unit_id".to_string(),
                serde_json::Value::String(identity.policy_unit_id.clone()),
            ),
            (
                "correlation_id".to_string(),
                serde_json::Value::String(identity.correlation_id.clone()),
            ),
        ]),
    };

    let integrity = CanonPolicyPackage::integrity_for(&outcome.graph);
    Ok(CanonPolicyPackage {
        manifest,
        graph: outcome.graph,
        content_stream: stream,
        provenance_map: provenance,
        integrity,
    })
}
