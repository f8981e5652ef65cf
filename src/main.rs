//! Binary entry point for the Canon Policy Package pipeline.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use cpp_rs::cli::output::{OutputFormat, format_error};
use cpp_rs::cli::{Cli, execute};
use std::io::{self, Write};
use std::process::ExitCode;

/// Installs the structured-diagnostics subscriber; JSON events when the
/// CLI output format is JSON.
fn init_tracing(format: OutputFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if format == OutputFormat::Json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);

    if let Err(e) = init_tracing(format) {
        eprintln!("Warning: {e}");
    }

    match execute(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                // Handle broken pipe gracefully (e.g., when piped to `head` or `jq`)
                if let Err(e) = write!(io::stdout(), "{output}")
                    && e.kind() != io::ErrorKind::BrokenPipe
                {
                    eprintln!("Error writing to stdout: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let error_output = format_error(&e, format);
            match format {
                OutputFormat::Json => {
                    // JSON errors go to stdout for programmatic parsing
                    println!("{error_output}");
                }
                OutputFormat::Text => {
                    eprintln!("Error: {error_output}");
                }
            }
            ExitCode::FAILURE
        }
    }
}
