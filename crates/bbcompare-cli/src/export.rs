//! Writers for the run artifact: one row per deal in csv and xlsx, the full
//! result with metadata and outcomes in json.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use bbcompare_core::{
    NormalizedDeal, ProviderOutcome, RunMetadata, RunResult, RunSummary, ValidationIssue,
};
use chrono::Local;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::Serialize;

const DEALS_SHEET: &str = "Broadband Deals";
const OUTCOMES_SHEET: &str = "Outcomes";
const MAX_COLUMN_WIDTH: usize = 50;

/// Deal columns, most useful for comparison first.
pub(crate) const DEAL_COLUMNS: [&str; 20] = [
    "provider",
    "deal_name",
    "monthly_price",
    "upfront_cost",
    "download_speed_mbps",
    "upload_speed_mbps",
    "contract_length_months",
    "total_contract_cost",
    "technology",
    "data_allowance",
    "promotional_price",
    "router_included",
    "phone_included",
    "tv_included",
    "availability_date",
    "postcode",
    "address",
    "source_url",
    "extracted_at",
    "validation_issues",
];

const OUTCOME_COLUMNS: [&str; 9] = [
    "provider_id",
    "provider",
    "status",
    "failure",
    "reason",
    "attempts",
    "deals_found",
    "deals_excluded",
    "duration_ms",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportFormat {
    Csv,
    Xlsx,
    Json,
}

impl ExportFormat {
    pub(crate) fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Text(String),
    Number(Decimal),
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn opt<T: ToString>(value: Option<T>) -> Self {
        value.map_or(Cell::Empty, |v| Cell::Text(v.to_string()))
    }

    fn number(value: Option<Decimal>) -> Self {
        value.map_or(Cell::Empty, Cell::Number)
    }

    fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

/// `broadband_comparison_<YYYYmmdd_HHMMSS>` in local time.
pub(crate) fn file_stem(metadata: &RunMetadata) -> String {
    format!(
        "broadband_comparison_{}",
        metadata
            .finished_at
            .with_timezone(&Local)
            .format("%Y%m%d_%H%M%S")
    )
}

/// Writes `result` once per format into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory or any file cannot be written.
pub(crate) fn write_all(
    result: &RunResult,
    formats: &[ExportFormat],
    dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    let stem = file_stem(&result.metadata);

    let mut written = Vec::with_capacity(formats.len());
    for format in formats {
        let path = dir.join(format!("{stem}.{}", format.extension()));
        match format {
            ExportFormat::Csv => write_csv(result, &path),
            ExportFormat::Xlsx => write_xlsx(result, &path),
            ExportFormat::Json => write_json(result, &path),
        }
        .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), deals = result.deals.len(), "exported");
        written.push(path);
    }
    Ok(written)
}

fn deal_row(deal: &NormalizedDeal) -> Vec<Cell> {
    vec![
        Cell::text(&deal.provider),
        Cell::opt(deal.deal_name.as_deref()),
        Cell::number(deal.monthly_price),
        Cell::number(deal.upfront_cost),
        Cell::number(deal.download_speed_mbps),
        Cell::number(deal.upload_speed_mbps),
        Cell::number(deal.contract_length_months.map(Decimal::from)),
        Cell::number(deal.total_contract_cost),
        Cell::text(deal.technology.to_string()),
        Cell::opt(deal.data_allowance.as_ref()),
        Cell::number(deal.promotional_price),
        Cell::opt(deal.router_included.map(yes_no)),
        Cell::opt(deal.phone_included.map(yes_no)),
        Cell::opt(deal.tv_included.map(yes_no)),
        Cell::opt(deal.availability_date.map(|d| d.format("%Y-%m-%d"))),
        Cell::text(&deal.metadata.postcode),
        Cell::opt(deal.metadata.address.as_deref()),
        Cell::text(&deal.metadata.source_url),
        Cell::text(deal.metadata.extracted_at.to_rfc3339()),
        Cell::text(issues_text(&deal.validation_issues)),
    ]
}

fn outcome_row(outcome: &ProviderOutcome) -> Vec<Cell> {
    vec![
        Cell::text(&outcome.provider_id),
        Cell::text(&outcome.provider_name),
        Cell::text(outcome.status.to_string()),
        Cell::opt(outcome.failure),
        Cell::opt(outcome.reason.as_deref()),
        Cell::Number(Decimal::from(outcome.attempts)),
        Cell::Number(Decimal::from(outcome.deals_found)),
        Cell::Number(Decimal::from(outcome.deals_excluded)),
        Cell::Number(Decimal::from(outcome.duration_ms)),
    ]
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// `field:kind` pairs joined with `; `.
fn issues_text(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| {
            let kind = serde_json::to_value(issue.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            format!("{}:{kind}", issue.field)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn write_csv(result: &RunResult, path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(DEAL_COLUMNS)?;
    for deal in &result.deals {
        writer.write_record(deal_row(deal).iter().map(Cell::as_text))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(result: &RunResult, path: &Path) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let deals: Vec<Vec<Cell>> = result.deals.iter().map(deal_row).collect();
    let sheet = workbook.add_worksheet();
    sheet.set_name(DEALS_SHEET)?;
    write_sheet(sheet, &DEAL_COLUMNS, &deals, &header)?;

    let outcomes: Vec<Vec<Cell>> = result.outcomes.iter().map(outcome_row).collect();
    let sheet = workbook.add_worksheet();
    sheet.set_name(OUTCOMES_SHEET)?;
    write_sheet(sheet, &OUTCOME_COLUMNS, &outcomes, &header)?;

    workbook.save(path)?;
    Ok(())
}

fn write_sheet(
    sheet: &mut Worksheet,
    columns: &[&str],
    rows: &[Vec<Cell>],
    header: &Format,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();

    for (col, name) in (0u16..).zip(columns) {
        sheet.write_string_with_format(0, col, *name, header)?;
    }
    for (row, cells) in (1u32..).zip(rows) {
        for ((col, cell), width) in (0u16..).zip(cells).zip(widths.iter_mut()) {
            match cell {
                Cell::Empty => {}
                Cell::Text(text) => {
                    sheet.write_string(row, col, text)?;
                }
                Cell::Number(n) => {
                    sheet.write_number(row, col, n.to_f64().unwrap_or_default())?;
                }
            }
            *width = (*width).max(cell.as_text().chars().count());
        }
    }
    for (col, width) in (0u16..).zip(widths) {
        let width = u32::try_from(width.min(MAX_COLUMN_WIDTH) + 2).unwrap_or(u32::MAX);
        sheet.set_column_width(col, width)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonExport<'a> {
    metadata: JsonMetadata<'a>,
    summary: RunSummary,
    outcomes: &'a [ProviderOutcome],
    deals: &'a [NormalizedDeal],
}

#[derive(Serialize)]
struct JsonMetadata<'a> {
    #[serde(flatten)]
    run: &'a RunMetadata,
    total_deals: usize,
    providers: Vec<&'a str>,
}

fn write_json(result: &RunResult, path: &Path) -> anyhow::Result<()> {
    let export = JsonExport {
        metadata: JsonMetadata {
            run: &result.metadata,
            total_deals: result.deals.len(),
            providers: result
                .outcomes
                .iter()
                .map(|o| o.provider_id.as_str())
                .collect(),
        },
        summary: result.summary(),
        outcomes: &result.outcomes,
        deals: &result.deals,
    };
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &export)?;
    Ok(())
}

#[cfg(test)]
#[path = "export_test.rs"]
mod tests;
