//! Tables and budget handling (Phase 6).
//!
//! Classifies parser table candidates into KPI and budget rows. A KPI
//! row must carry indicator, baseline, target and unit or the phase
//! aborts; a budget row with itemized components must balance to within
//! the configured tolerance.

use crate::error::{IngestError, Result};
use crate::graph::chunk::{BudgetRecord, KpiRecord};
use crate::parser::TableCandidate;
use regex::Regex;
use std::sync::LazyLock;

/// Extracted tabular evidence, with the source byte range of each row's
/// table so chunking can attach records to their originating chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableEvidence {
    /// KPI rows and the byte range of their table.
    pub kpis: Vec<(KpiRecord, (usize, usize))>,
    /// Budget rows and the byte range of their table.
    pub budgets: Vec<(BudgetRecord, (usize, usize))>,
}

#[allow(clippy::unwrap_used)]
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(COP\s*)?\$?\s*\d{1,3}(\.\d{3})+(,\d+)?|\$\s*\d+").unwrap()
});

#[allow(clippy::unwrap_used)]
static KPI_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)indicador").unwrap());

/// Extracts KPI and budget evidence from table candidates.
///
/// `offset` shifts the candidates' page-relative ranges into content
/// stream coordinates.
///
/// # Errors
///
/// Aborts on an incomplete KPI row or an unbalanced itemized budget row.
pub fn extract_table_evidence(
    candidates: &[TableCandidate],
    offset: usize,
    tolerance: f64,
) -> Result<TableEvidence> {
    let mut evidence = TableEvidence::default();

    for (table_index, candidate) in candidates.iter().enumerate() {
        let range = (
            candidate.byte_range.0 + offset,
            candidate.byte_range.1 + offset,
        );
        let Some((header, data_rows)) = candidate.rows.split_first() else {
            continue;
        };

        if header.iter().any(|cell| KPI_HEADER_RE.is_match(cell)) {
            for (row_index, row) in data_rows.iter().enumerate() {
                let row_id = format!("t{table_index}-r{row_index}");
                evidence
                    .kpis
                    .push((kpi_from_row(row, &row_id)?, range));
            }
        } else {
            for (row_index, row) in data_rows.iter().enumerate() {
                let row_id = format!("t{table_index}-r{row_index}");
                if let Some(budget) = budget_from_row(row, &row_id, tolerance)? {
                    evidence.budgets.push((budget, range));
                }
            }
        }
    }

    Ok(evidence)
}

/// Builds a KPI record; every one of the four attributes is mandatory.
fn kpi_from_row(row: &[String], row_id: &str) -> Result<KpiRecord> {
    let incomplete = |attribute: &'static str| IngestError::KpiIncomplete {
        row_id: row_id.to_string(),
        attribute,
    };
    let cell = |index: usize| row.get(index).map(String::as_str).unwrap_or_default();

    let indicator = cell(0);
    if indicator.is_empty() {
        return Err(incomplete("indicator").into());
    }
    let baseline = cell(1);
    if baseline.is_empty() {
        return Err(incomplete("baseline").into());
    }
    let target = cell(2);
    if target.is_empty() {
        return Err(incomplete("target").into());
    }
    let unit = cell(3);
    if unit.is_empty() {
        return Err(incomplete("unit").into());
    }

    Ok(KpiRecord {
        indicator: indicator.to_string(),
        baseline: baseline.to_string(),
        target: target.to_string(),
        unit: unit.to_string(),
    })
}

/// Builds a budget record from a row carrying money amounts.
///
/// Rows with three or more amounts are treated as itemized: the last
/// amount is the total, the rest its components, and the row must
/// balance within tolerance. Rows with fewer amounts balance trivially.
/// Rows without amounts are not budget rows.
fn budget_from_row(
    row: &[String],
    row_id: &str,
    tolerance: f64,
) -> Result<Option<BudgetRecord>> {
    let mut amounts = Vec::new();
    for cell in row {
        for m in MONEY_RE.find_iter(cell) {
            if let Some(value) = parse_amount(m.as_str()) {
                amounts.push(value);
            }
        }
    }
    if amounts.is_empty() {
        return Ok(None);
    }

    let label = row.first().cloned().unwrap_or_default();
    let (total, components, imbalance) = if amounts.len() >= 3 {
        let total = amounts[amounts.len() - 1];
        let components = amounts[..amounts.len() - 1].to_vec();
        let component_sum: f64 = components.iter().sum();
        let imbalance = (component_sum - total).abs() / total.max(1.0);
        (total, components, imbalance)
    } else {
        (amounts[amounts.len() - 1], Vec::new(), 0.0)
    };

    if imbalance > tolerance {
        return Err(IngestError::BudgetImbalance {
            row_id: row_id.to_string(),
            imbalance,
            tolerance,
        }
        .into());
    }

    Ok(Some(BudgetRecord {
        label,
        amount: total,
        components,
        imbalance,
    }))
}

/// Parses a Colombian-format amount: `.` thousands, `,` decimals.
fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .collect();
    let normalized = cleaned.replace(',', ".");
    normalized.parse().ok()
}
