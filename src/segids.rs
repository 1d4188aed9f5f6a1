// Identifier-source resolution: explicit lists, local CSV files, and the
// tracking sheet's CSV export. Unparseable cells are dropped; deciding what to
// do with an empty result belongs to the CLI boundary.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// Default segment-ID column in a local CSV file.
pub const DEFAULT_CSV_COLUMN: &str = "Final SegID";

/// Columns of the tracking sheet export.
const SHEET_ID_COLUMN: &str = "Updated Seg ID (Sept 2)";
const SHEET_STATUS_COLUMN: &str = "Status";
const SHEET_REVIEW_COLUMN: &str = "Cell Requires Review (DO NOT use Updated IDs for those cells)";

/// Where segment IDs come from.
#[derive(Debug, Clone)]
pub enum SegidSource {
    Explicit(Vec<u64>),
    CsvFile {
        path: PathBuf,
        column: Option<String>,
    },
    Sheet {
        sheet_id: String,
        status_filter: Vec<String>,
        review_filter: Vec<String>,
    },
}

/// Resolve the source to a concrete ID sequence, in source order.
pub async fn resolve(source: SegidSource) -> Result<Vec<u64>> {
    match source {
        SegidSource::Explicit(ids) => Ok(ids),
        SegidSource::CsvFile { path, column } => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let column = column.as_deref().unwrap_or(DEFAULT_CSV_COLUMN);
            let ids = ids_from_csv(&text, column)?;
            info!(count = ids.len(), path = %path.display(), "resolved segment IDs from CSV");
            Ok(ids)
        }
        SegidSource::Sheet {
            sheet_id,
            status_filter,
            review_filter,
        } => {
            let url =
                format!("https://docs.google.com/spreadsheets/d/{sheet_id}/export?format=csv");
            let text = reqwest::get(&url)
                .await
                .and_then(|r| r.error_for_status())
                .with_context(|| format!("failed to fetch sheet {sheet_id}"))?
                .text()
                .await
                .context("failed to read sheet response body")?;
            let ids = ids_from_sheet_csv(&text, &status_filter, &review_filter)?;
            info!(count = ids.len(), sheet_id, "resolved segment IDs from sheet");
            Ok(ids)
        }
    }
}

/// Parse a spreadsheet cell into a segment ID. Sheets export integer columns
/// as floats ("12345.0"), so an integral float is accepted too.
fn parse_cell(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(id) = value.parse::<u64>() {
        return Some(id);
    }
    match value.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 => Some(f as u64),
        _ => None,
    }
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == column)
        .with_context(|| format!("column {column:?} not found in CSV header"))
}

/// Extract IDs from a single CSV column, dropping unparseable cells.
pub fn ids_from_csv(text: &str, column: &str) -> Result<Vec<u64>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let idx = column_index(&reader.headers().context("failed to read CSV header")?.clone(), column)?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to read CSV record")?;
        match record.get(idx).and_then(parse_cell) {
            Some(id) => ids.push(id),
            None => {
                if let Some(cell) = record.get(idx) {
                    if !cell.trim().is_empty() {
                        warn!(cell, "dropping unparseable segment ID cell");
                    }
                }
            }
        }
    }
    Ok(ids)
}

/// Extract IDs from the tracking sheet export, keeping only rows whose status
/// and review cells pass the filters. An empty filter accepts any value.
pub fn ids_from_sheet_csv(
    text: &str,
    status_filter: &[String],
    review_filter: &[String],
) -> Result<Vec<u64>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader.headers().context("failed to read sheet header")?.clone();
    let id_idx = column_index(&headers, SHEET_ID_COLUMN)?;
    let status_idx = column_index(&headers, SHEET_STATUS_COLUMN)?;
    let review_idx = column_index(&headers, SHEET_REVIEW_COLUMN)?;

    let passes = |cell: Option<&str>, filter: &[String]| {
        filter.is_empty() || cell.is_some_and(|c| filter.iter().any(|f| f == c.trim()))
    };

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to read sheet record")?;
        if !passes(record.get(status_idx), status_filter) {
            continue;
        }
        if !passes(record.get(review_idx), review_filter) {
            continue;
        }
        if let Some(id) = record.get(id_idx).and_then(parse_cell) {
            ids.push(id);
        }
    }
    Ok(ids)
}
