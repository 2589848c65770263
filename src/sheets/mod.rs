//! Remote spreadsheet access
//!
//! This module hides the spreadsheet service behind the narrow
//! [`SheetSource`] trait so that commands and the watch loop can be tested
//! against in-process fakes.
//!
//! # Modules
//!
//! - [`auth`]: service-account access tokens
//! - [`client`]: reqwest-backed Sheets API v4 client

pub mod auth;
pub mod client;

pub use auth::{ServiceAccountKey, ServiceAccountTokenSource, StaticTokenSource, TokenSource};
pub use client::SheetsClient;

use crate::error::{Result, SheetsError};
use crate::model::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Properties of the configured worksheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetMetadata {
    /// Worksheet title (tab name)
    pub title: String,
    /// Numeric worksheet id within the spreadsheet
    pub sheet_id: i64,
    /// Grid rows, including empty ones
    pub row_count: u64,
    /// Grid columns, including empty ones
    pub column_count: u64,
}

/// Read-only view of one worksheet
///
/// Implementations never mutate remote state.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Fetch every populated cell of the worksheet, row-major, header first
    async fn fetch_values(&self) -> Result<Vec<Vec<String>>>;

    /// Fetch worksheet properties without reading cell data
    async fn worksheet_metadata(&self) -> Result<WorksheetMetadata>;
}

/// Header row plus data rows of a worksheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Column headers in sheet order
    pub headers: Vec<String>,
    /// Data rows keyed by header
    pub rows: Vec<Row>,
}

/// Convert a raw value grid into keyed rows
///
/// The first row is the header. Short rows are padded with empty strings;
/// cells beyond the header width are dropped.
///
/// # Errors
///
/// Returns `SheetsError::Data` when the grid is empty or holds only the
/// header row.
///
/// # Examples
///
/// ```
/// use sheets_reader::sheets::rows_from_values;
///
/// let values = vec![
///     vec!["title".to_string(), "status".to_string()],
///     vec!["Intro".to_string()],
/// ];
/// let table = rows_from_values(values).unwrap();
/// assert_eq!(table.rows[0]["status"], "");
/// ```
pub fn rows_from_values(values: Vec<Vec<String>>) -> Result<Table> {
    let mut iter = values.into_iter();
    let headers = match iter.next() {
        Some(headers) if headers.iter().any(|h| !h.trim().is_empty()) => headers,
        _ => return Err(SheetsError::Data("Worksheet is empty".to_string())),
    };

    let rows: Vec<Row> = iter
        .map(|cells| {
            let mut cells = cells.into_iter();
            headers
                .iter()
                .map(|header| (header.clone(), cells.next().unwrap_or_default()))
                .collect()
        })
        .collect();

    if rows.is_empty() {
        return Err(SheetsError::Data(
            "Worksheet contains only headers".to_string(),
        ));
    }

    Ok(Table { headers, rows })
}
