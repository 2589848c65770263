//! Extraction pipeline
//!
//! fetch → rows → filter → project → limit, shared by `run` and `watch`.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, SheetsError};
use crate::filter::FilterExpression;
use crate::model::{ExtractionResult, Row};
use crate::sheets::{rows_from_values, SheetSource, Table};

/// What to extract from the worksheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionRequest {
    /// Rows must match every clause
    pub filter: FilterExpression,
    /// Columns to keep, in output order; `None` keeps all
    pub columns: Option<Vec<String>>,
    /// Maximum number of records
    pub limit: Option<usize>,
}

/// Parse a comma-separated column list
///
/// # Errors
///
/// Returns `SheetsError::Config` if no column is named or a column is
/// named twice.
///
/// # Examples
///
/// ```
/// use sheets_reader::extract::parse_columns;
///
/// let columns = parse_columns(" title, status ").unwrap();
/// assert_eq!(columns, vec!["title", "status"]);
/// ```
pub fn parse_columns(csv: &str) -> Result<Vec<String>> {
    let mut columns: Vec<String> = Vec::new();
    for name in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if columns.iter().any(|c| c == name) {
            return Err(SheetsError::Config(format!(
                "Column '{}' listed more than once",
                name
            )));
        }
        columns.push(name.to_string());
    }

    if columns.is_empty() {
        return Err(SheetsError::Config(
            "--columns must name at least one column".to_string(),
        ));
    }
    Ok(columns)
}

/// Fetch the worksheet and apply the request
pub async fn extract(
    source: &dyn SheetSource,
    request: &ExtractionRequest,
) -> Result<ExtractionResult> {
    let values = source.fetch_values().await?;
    let table = rows_from_values(values)?;
    let total = table.rows.len();
    let records = select_records(table, request)?;

    tracing::info!(
        total_rows = total,
        records = records.len(),
        filter = %request.filter.summary(),
        "Extraction complete"
    );
    Ok(ExtractionResult::new(records))
}

/// Filter, project and limit the rows of a table
///
/// # Errors
///
/// Returns `SheetsError::Data` when a projected column is not in the
/// header row.
pub fn select_records(table: Table, request: &ExtractionRequest) -> Result<Vec<Row>> {
    if let Some(columns) = &request.columns {
        let missing: Vec<&str> = columns
            .iter()
            .filter(|c| !table.headers.contains(*c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(SheetsError::Data(format!(
                "Columns not found in worksheet: {}",
                missing.join(", ")
            )));
        }
    }

    let limit = request.limit.unwrap_or(usize::MAX);
    let records = table
        .rows
        .into_iter()
        .filter(|row| request.filter.matches(row))
        .map(|row| match &request.columns {
            Some(columns) => project(row, columns),
            None => row,
        })
        .take(limit)
        .collect();
    Ok(records)
}

fn project(mut row: Row, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|c| {
            let value = row.swap_remove(c).unwrap_or_default();
            (c.clone(), value)
        })
        .collect()
}

/// Serialize `value` as JSON to a file or stdout
///
/// Files are overwritten and missing parent directories are created.
pub fn write_json<T: Serialize>(value: &T, out: Option<&Path>, pretty: bool) -> Result<()> {
    let mut json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    json.push('\n');

    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)?;
            tracing::debug!(path = %path.display(), "Wrote output file");
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(json.as_bytes())?;
            handle.flush()?;
        }
    }
    Ok(())
}
