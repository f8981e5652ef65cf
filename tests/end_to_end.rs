//! End-to-end pipeline tests over a synthetic development plan and a
//! generated 300-question monolith.

use cpp_rs::config::PipelineConfig;
use cpp_rs::content::store::DeclaredMetadata;
use cpp_rs::ids::{Dimension, PolicyArea};
use cpp_rs::run::{DocumentRun, RunOptions};
use cpp_rs::schema::{SchemaSpec, dimension_default_schema};
use cpp_rs::signal::monolith::{MonolithBlocks, MonolithIntegrity, QuestionMonolith, QuestionSpec};
use cpp_rs::signal::{MonolithProvider, SignalRegistry};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

/// A synthetic municipal development plan with two Ejes, a KPI table
/// and a budget table.
fn plan_document() -> String {
    let mut text = String::from("Plan de desarrollo del municipio de Arauquita 2024 2027\n");
    text.push_str("Eje estratégico 1: Desarrollo social incluyente\n");
    text.push_str("Programa de seguridad alimentaria\n");
    for i in 0..30 {
        text.push_str(&format!(
            "La meta numero {i} busca reducir la desnutrición infantil mediante comedores. \
             Se asignan recursos para la vigencia 2024.\n"
        ));
    }
    text.push_str("Indicador | Línea base | Meta | Unidad\n");
    text.push_str("tasa de desnutrición | 12% | 10% | porcentaje\n");
    text.push_str("Eje estratégico 2: Infraestructura para la paz\n");
    for i in 0..30 {
        text.push_str(&format!(
            "El proyecto {i} construye vías para conectar veredas con la cabecera. \
             La inversión mejora el acceso rural.\n"
        ));
    }
    text.push_str("Rubro | 2024 | 2025 | Total\n");
    text.push_str("vías terciarias | 1.000.000 | 2.000.000 | 3.000.000\n");
    text
}

/// Modality assignment per dimension, mirroring the instrument's layout.
fn modality_for_dimension(dim: u8) -> &'static str {
    match dim {
        1 => "TYPE_D",
        2 => "TYPE_A",
        3 => "TYPE_E",
        4 => "TYPE_C",
        5 => "TYPE_B",
        _ => "TYPE_F",
    }
}

/// A question schema compatible with the cell chunks' dimension schema.
fn question_schema(dim: u8) -> SchemaSpec {
    match dimension_default_schema(Dimension::new(dim).unwrap()) {
        SchemaSpec::List(items) => SchemaSpec::List(
            items
                .into_iter()
                .map(|mut e| {
                    e.required = false;
                    e.minimum = Some(1.0);
                    e
                })
                .collect(),
        ),
        SchemaSpec::Map(items) => SchemaSpec::Map(items),
    }
}

/// Generates the full 300-question monolith: question i covers policy
/// area ((i-1) % 10) + 1, dimension ((i-1) / 50) + 1, slot question
/// (((i-1) / 10) % 5) + 1.
fn monolith() -> QuestionMonolith {
    let questions: Vec<QuestionSpec> = (1..=300u32)
        .map(|i| {
            let dim = u8::try_from((i - 1) / 50 + 1).unwrap();
            let q = u8::try_from(((i - 1) / 10) % 5 + 1).unwrap();
            let pa = u8::try_from((i - 1) % 10 + 1).unwrap();
            let pa_tag = format!("PA{pa:02}");
            QuestionSpec {
                question_global: i,
                base_slot: format!("D{dim}-Q{q}"),
                policy_area_id: pa_tag.clone(),
                dimension_id: format!("D{dim}"),
                cluster_id: Some(format!("CL{dim:02}")),
                patterns: vec![
                    json!({
                        "id": format!("pat-{i}-a"),
                        "policy_area_id": pa_tag,
                        "text": "meta",
                        "weight": 0.9,
                        "category": "structural",
                    }),
                    json!({
                        "id": format!("pat-{i}-b"),
                        "policy_area_id": "PA99",
                        "text": "irrelevante",
                        "weight": 0.1,
                        "category": "noise",
                    }),
                ],
                expected_elements: Some(question_schema(dim)),
                validations: None,
                scoring_modality: modality_for_dimension(dim).to_string(),
                required_signals: vec!["patterns".to_string()],
            }
        })
        .collect();

    QuestionMonolith {
        schema_version: "2.0.0".to_string(),
        schema: None,
        integrity: MonolithIntegrity::default(),
        canonical_notation: Some("Dk-Qj".to_string()),
        blocks: MonolithBlocks::default(),
        questions,
    }
}

fn runner() -> DocumentRun {
    let provider =
        Arc::new(MonolithProvider::from_monolith(monolith(), "inline".to_string()).unwrap());
    let config = PipelineConfig::default();
    let registry = Arc::new(SignalRegistry::new(provider, &config.signals));
    DocumentRun::new(config, registry)
}

fn write_plan() -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(plan_document().as_bytes()).unwrap();
    tmp
}

fn options(out_dir: Option<std::path::PathBuf>) -> RunOptions {
    RunOptions {
        policy_unit_id: "pu-arauquita".to_string(),
        correlation_id: Some("corr-e2e".to_string()),
        out_dir,
        declared: DeclaredMetadata {
            title: Some("Plan de desarrollo".to_string()),
            version: Some("1.0".to_string()),
        },
    }
}

#[test]
fn full_run_succeeds_with_300_results() {
    let plan = write_plan();
    let manifest = runner().execute(plan.path(), &options(None)).unwrap();

    assert!(manifest.success);
    assert_eq!(manifest.evidence_hashes.len(), 300);
    assert_eq!(manifest.aggregates.dimensions.len(), 60);
    assert_eq!(manifest.aggregates.policy_areas.len(), 10);
    assert!(manifest.gate_outcomes.iter().all(|g| g.passed));
    assert!(manifest.aggregates.overall > 0.0);
    assert!(manifest.aggregates.overall <= 1.0);
}

#[test]
fn repeated_runs_agree_on_every_hash_and_score() {
    let plan = write_plan();
    let runner = runner();
    let a = runner.execute(plan.path(), &options(None)).unwrap();
    let b = runner.execute(plan.path(), &options(None)).unwrap();

    assert_eq!(a.source_hash, b.source_hash);
    assert_eq!(a.cpp_merkle_root, b.cpp_merkle_root);
    assert_eq!(a.plan_integrity_hash, b.plan_integrity_hash);
    assert_eq!(a.evidence_hashes, b.evidence_hashes);
    assert!((a.aggregates.overall - b.aggregates.overall).abs() < f64::EPSILON);
    for (da, db) in a.aggregates.dimensions.iter().zip(&b.aggregates.dimensions) {
        assert!((da.score - db.score).abs() < f64::EPSILON);
    }
}

#[test]
fn artifacts_written_to_out_dir() {
    let plan = write_plan();
    let out = tempfile::tempdir().unwrap();
    let manifest = runner()
        .execute(plan.path(), &options(Some(out.path().to_path_buf())))
        .unwrap();
    assert!(manifest.success);

    let cpp_dir = out.path().join("cpp");
    for artifact in [
        "manifest.json",
        "chunk_graph.json",
        "integrity.json",
        "content_stream.arrow",
        "provenance_map.arrow",
    ] {
        assert!(cpp_dir.join(artifact).exists(), "missing {artifact}");
    }
    assert!(out.path().join("verification_manifest.json").exists());

    // The written CPP reloads and passes its integrity check
    let package = cpp_rs::CanonPolicyPackage::read_from_dir(&cpp_dir).unwrap();
    assert_eq!(package.integrity.merkle_root, manifest.cpp_merkle_root);
}

#[test]
fn cell_coverage_is_complete() {
    let plan = write_plan();
    let out = tempfile::tempdir().unwrap();
    runner()
        .execute(plan.path(), &options(Some(out.path().to_path_buf())))
        .unwrap();
    let package = cpp_rs::CanonPolicyPackage::read_from_dir(out.path().join("cpp")).unwrap();
    let matrix = cpp_rs::ChunkMatrix::from_package(&package).unwrap();
    assert_eq!(matrix.len(), 60);
    for pa in PolicyArea::all() {
        for dim in Dimension::all() {
            assert!(matrix.get(pa, dim).is_some(), "missing cell {pa}-{dim}");
        }
    }
}

#[test]
fn tampered_document_changes_source_hash() {
    let plan_a = write_plan();
    let mut tampered = plan_document();
    tampered.push_str("Linea adicional al final.\n");
    let mut plan_b = tempfile::NamedTempFile::new().unwrap();
    plan_b.write_all(tampered.as_bytes()).unwrap();

    let runner = runner();
    let a = runner.execute(plan_a.path(), &options(None)).unwrap();
    let b = runner.execute(plan_b.path(), &options(None)).unwrap();
    assert_ne!(a.source_hash, b.source_hash);
    assert_ne!(a.cpp_merkle_root, b.cpp_merkle_root);
}

#[test]
fn incomplete_monolith_fails_plan_cardinality() {
    let mut incomplete = monolith();
    incomplete.questions.truncate(299);
    let provider =
        Arc::new(MonolithProvider::from_monolith(incomplete, "inline".to_string()).unwrap());
    let config = PipelineConfig::default();
    let registry = Arc::new(SignalRegistry::new(provider, &config.signals));
    let runner = DocumentRun::new(config, registry);

    let plan = write_plan();
    let err = runner.execute(plan.path(), &options(None)).unwrap_err();
    assert!(err.to_string().contains("299"));
}

mod cli {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn write_monolith() -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(serde_json::to_string(&monolith()).unwrap().as_bytes())
            .unwrap();
        tmp
    }

    #[test]
    fn analyze_exits_zero_on_success() {
        let plan = write_plan();
        let monolith_file = write_monolith();
        let out = tempfile::tempdir().unwrap();

        Command::cargo_bin("cpp-rs")
            .unwrap()
            .args([
                "analyze",
                &plan.path().to_string_lossy(),
                "--policy-unit-id",
                "pu-cli",
                "--correlation-id",
                "corr-cli",
                "--out",
                &out.path().to_string_lossy(),
                "--monolith",
                &monolith_file.path().to_string_lossy(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("success: true"));
    }

    #[test]
    fn analyze_exits_nonzero_without_monolith() {
        let plan = write_plan();
        Command::cargo_bin("cpp-rs")
            .unwrap()
            .args([
                "analyze",
                &plan.path().to_string_lossy(),
                "--policy-unit-id",
                "pu-cli",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--monolith"));
    }

    #[test]
    fn analyze_exits_nonzero_on_missing_document() {
        let monolith_file = write_monolith();
        Command::cargo_bin("cpp-rs")
            .unwrap()
            .args([
                "analyze",
                "/nonexistent/plan.txt",
                "--policy-unit-id",
                "pu-cli",
                "--monolith",
                &monolith_file.path().to_string_lossy(),
            ])
            .assert()
            .failure();
    }

    #[test]
    fn check_contracts_reports_valid_matrix() {
        let plan = write_plan();
        Command::cargo_bin("cpp-rs")
            .unwrap()
            .args([
                "analyze",
                &plan.path().to_string_lossy(),
                "--policy-unit-id",
                "pu-cli",
                "--check-contracts",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("contract valid: true"));
    }
}
