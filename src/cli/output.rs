//! Output formatting for CLI results and errors.

use crate::error::{Error, Result};
use crate::manifest::VerificationManifest;
use crate::matrix::ContractReport;
use std::fmt::Write as _;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Renders a verification manifest.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_manifest(manifest: &VerificationManifest, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(manifest)?),
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "success: {}", manifest.success);
            let _ = writeln!(out, "policy unit: {}", manifest.policy_unit_id);
            let _ = writeln!(out, "correlation: {}", manifest.correlation_id);
            let _ = writeln!(out, "source hash: {}", manifest.source_hash);
            let _ = writeln!(out, "cpp merkle root: {}", manifest.cpp_merkle_root);
            let _ = writeln!(out, "plan hash: {}", manifest.plan_integrity_hash);
            let _ = writeln!(out, "overall score: {:.4}", manifest.aggregates.overall);
            let _ = writeln!(out, "policy areas:");
            for area in &manifest.aggregates.policy_areas {
                let _ = writeln!(out, "  {}: {:.4}", area.policy_area, area.score);
            }
            let _ = writeln!(out, "gates:");
            for gate in &manifest.gate_outcomes {
                let status = if gate.passed { "pass" } else { "FAIL" };
                let _ = writeln!(
                    out,
                    "  {}: {:.4} (threshold {:.4}) {status}",
                    gate.gate, gate.measured, gate.threshold
                );
            }
            Ok(out)
        }
    }
}

/// Renders a chunk-matrix contract report.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_contract_report(report: &ContractReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "contract valid: {}", report.valid);
            let _ = writeln!(out, "chunks checked: {}", report.checked);
            let _ = writeln!(out, "violations: {}", report.violation_count);
            for violation in &report.violations {
                let _ = writeln!(out, "  - {violation}");
            }
            if report.violation_count > report.violations.len() {
                let _ = writeln!(
                    out,
                    "  ... and {} more",
                    report.violation_count - report.violations.len()
                );
            }
            Ok(out)
        }
    }
}

/// Renders an error for the chosen format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::json!({
            "error": error.to_string(),
            "data_contract": error.is_data_contract(),
        })
        .to_string(),
        OutputFormat::Text => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("weird"), OutputFormat::Text);
    }

    #[test]
    fn test_format_error_json() {
        let error = Error::Config {
            message: "bad config".to_string(),
        };
        let rendered = format_error(&error, OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("bad config"));
        assert_eq!(parsed["data_contract"], serde_json::json!(true));
    }

    #[test]
    fn test_format_contract_report_text() {
        let report = ContractReport {
            checked: 59,
            valid: false,
            violation_count: 12,
            violations: vec!["missing cell PA05-DIM03".to_string()],
        };
        let rendered = format_contract_report(&report, OutputFormat::Text).unwrap();
        assert!(rendered.contains("contract valid: false"));
        assert!(rendered.contains("PA05-DIM03"));
        assert!(rendered.contains("11 more"));
    }
}
