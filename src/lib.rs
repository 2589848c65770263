//! sheets-reader - Google Sheets worksheet reader library
//!
//! This library provides the pieces behind the `sheets-reader` CLI: reading
//! one worksheet through the Sheets API with service-account credentials,
//! filtering and projecting its rows, and emitting the result as JSON once,
//! periodically, or as a health report.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `config`: Environment-based settings and validation
//! - `error`: Error taxonomy and exit codes
//! - `logging`: Tracing setup and sensitive-value masking
//! - `sheets`: Sheets API client, access tokens and the `SheetSource` trait
//! - `model`: Rows, extraction results and health reports
//! - `filter`: Filter expression parser and evaluator
//! - `extract`: Extraction pipeline and JSON output
//! - `watcher`: Watch-mode polling loop
//! - `cli`, `commands`: Command-line interface and handlers
//!
//! # Example
//!
//! ```no_run
//! use sheets_reader::extract::{extract, ExtractionRequest};
//! use sheets_reader::filter::FilterExpression;
//! use sheets_reader::{Settings, SheetsClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let client = SheetsClient::from_settings(&settings)?;
//!
//!     let request = ExtractionRequest {
//!         filter: FilterExpression::parse("status=ACTIVE")?,
//!         ..Default::default()
//!     };
//!     let result = extract(&client, &request).await?;
//!     println!("{} records", result.count);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod logging;
pub mod model;
pub mod sheets;
pub mod watcher;

// Re-export commonly used types
pub use config::Settings;
pub use error::{Result, SheetsError};
pub use filter::{FilterClause, FilterExpression};
pub use model::{ExtractionResult, HealthReport, Row};
pub use sheets::{SheetSource, SheetsClient};
