//! Command-line argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Canon Policy Package pipeline.
#[derive(Debug, Parser)]
#[command(name = "cpp-rs", version, about = "Deterministic policy-document evaluation pipeline")]
pub struct Cli {
    /// Output format: text or json.
    #[arg(long, global = true, default_value = "text")]
    pub format: String,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyzes a document against the evaluation instrument.
    Analyze {
        /// Path to the policy document (PDF, DOCX or plain text).
        document: PathBuf,

        /// Policy unit identifier for the run.
        #[arg(long)]
        policy_unit_id: String,

        /// Correlation id; generated when absent.
        #[arg(long)]
        correlation_id: Option<String>,

        /// Output directory for the CPP and verification manifest.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Path to the question monolith JSON.
        ///
        /// Required unless `--check-contracts` runs ingestion only.
        #[arg(long)]
        monolith: Option<PathBuf>,

        /// Path to the pipeline configuration JSON.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run ingestion and report the chunk-matrix contract instead of
        /// executing the full evaluation.
        #[arg(long)]
        check_contracts: bool,
    },
}
