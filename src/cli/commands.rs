//! Command execution.

use crate::cli::output::{OutputFormat, format_contract_report, format_manifest};
use crate::cli::parser::{Cli, Commands};
use crate::config::PipelineConfig;
use crate::content::store::DeclaredMetadata;
use crate::error::{Error, Result};
use crate::matrix::ChunkMatrix;
use crate::parser::AdapterRegistry;
use crate::pipeline::{RunIdentity, run_ingestion};
use crate::run::{CancelToken, DocumentRun, RunOptions};
use crate::signal::{MonolithProvider, SignalRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Executes the parsed CLI command.
///
/// Returns the rendered output; the caller maps success to the exit code.
///
/// # Errors
///
/// Propagates every pipeline ABORT plus a `RunFailed` config error when
/// the manifest reports failure (so the process exits non-zero).
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    match &cli.command {
        Commands::Analyze {
            document,
            policy_unit_id,
            correlation_id,
            out,
            monolith,
            config,
            check_contracts,
        } => {
            let config = load_config(config.as_deref())?;
            if *check_contracts {
                return check_contracts_mode(document, &config, policy_unit_id, format);
            }
            analyze(
                document,
                policy_unit_id,
                correlation_id.clone(),
                out.clone(),
                monolith.as_deref(),
                config,
                format,
            )
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path),
        None => {
            let config = PipelineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn analyze(
    document: &Path,
    policy_unit_id: &str,
    correlation_id: Option<String>,
    out: Option<PathBuf>,
    monolith: Option<&Path>,
    config: PipelineConfig,
    format: OutputFormat,
) -> Result<String> {
    let monolith = monolith.ok_or_else(|| Error::Config {
        message: "--monolith is required for a full analyze run".to_string(),
    })?;
    let provider = Arc::new(MonolithProvider::load(monolith)?);
    let registry = Arc::new(SignalRegistry::new(provider, &config.signals));
    let runner = DocumentRun::new(config, registry);

    let manifest = runner.execute(
        document,
        &RunOptions {
            policy_unit_id: policy_unit_id.to_string(),
            correlation_id,
            out_dir: out,
            declared: DeclaredMetadata::default(),
        },
    )?;

    let rendered = format_manifest(&manifest, format)?;
    if manifest.success {
        Ok(rendered)
    } else {
        // Non-zero exit with the rendered diagnostics on stdout
        Err(Error::Config {
            message: format!("run did not succeed\n{rendered}"),
        })
    }
}

/// Read-only diagnostics: ingest, then report the chunk-matrix contract.
fn check_contracts_mode(
    document: &Path,
    config: &PipelineConfig,
    policy_unit_id: &str,
    format: OutputFormat,
) -> Result<String> {
    let identity = RunIdentity {
        policy_unit_id: policy_unit_id.to_string(),
        correlation_id: uuid::Uuid::new_v4().to_string(),
    };
    let package = run_ingestion(
        document,
        &DeclaredMetadata::default(),
        &AdapterRegistry::new(),
        config,
        &identity,
        &CancelToken::with_timeout(config.timeout_s),
    )?;
    let candidates: Vec<crate::graph::Chunk> = package
        .graph
        .chunks()
        .filter(|c| c.policy_area_id.is_some() && c.dimension_id.is_some())
        .cloned()
        .collect();
    let report = ChunkMatrix::validate_contract(&candidates);
    format_contract_report(&report, format)
}
