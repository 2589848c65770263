//! Data types shared by the commands
//!
//! Rows are insertion-ordered maps keyed by the worksheet's header cells, so
//! serialized records keep the column order of the sheet (or of the
//! requested projection).

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One data row: column header to cell value, in column order
pub type Row = IndexMap<String, String>;

/// Current time as an RFC 3339 string with millisecond precision
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Output of one extraction
///
/// # Examples
///
/// ```
/// use sheets_reader::model::{ExtractionResult, Row};
///
/// let mut row = Row::new();
/// row.insert("title".to_string(), "Intro".to_string());
///
/// let result = ExtractionResult::new(vec![row]);
/// assert_eq!(result.count, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// When the extraction completed (ISO-8601)
    pub timestamp: String,
    /// Number of records
    pub count: usize,
    /// Filtered and projected rows
    pub records: Vec<Row>,
}

impl ExtractionResult {
    /// Wrap records with the current timestamp and their count
    pub fn new(records: Vec<Row>) -> Self {
        Self {
            timestamp: timestamp_now(),
            count: records.len(),
            records,
        }
    }
}

/// Outcome category of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Worksheet metadata was read successfully
    Healthy,
    /// Credentials were rejected
    AuthError,
    /// Any other failure (network, missing worksheet, bad response)
    Error,
}

/// Health check report written as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// True only when status is healthy
    pub ok: bool,
    /// Outcome category
    pub status: HealthStatus,
    /// Round-trip time of the metadata call
    pub latency_ms: u64,
    /// When the check ran (ISO-8601)
    pub timestamp: String,
    /// Worksheet title reported by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worksheet: Option<String>,
    /// Grid row count of the worksheet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// Grid column count of the worksheet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_count: Option<u64>,
    /// Masked failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
