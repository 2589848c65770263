//! Command-line interface definition for sheets-reader
//!
//! This module defines the CLI structure using clap's derive API. Logging
//! flags are global; spreadsheet settings come from the environment.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::Result;
use crate::extract::{parse_columns, ExtractionRequest};
use crate::filter::FilterExpression;
use crate::logging::{LogLevel, LogOptions};
use crate::watcher::EmitMode;

/// sheets-reader - read rows from a Google Sheets worksheet as JSON
///
/// Requires GOOGLE_APPLICATION_CREDENTIALS, SHEET_ID and WORKSHEET_NAME.
#[derive(Parser, Debug, Clone)]
#[command(name = "sheets-reader")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    /// Also append logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Do not log to stderr
    #[arg(long, global = true)]
    pub no_console: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Extract rows once
    Run {
        #[command(flatten)]
        extract: ExtractArgs,

        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Extract rows periodically until interrupted
    Watch {
        /// Seconds between extractions (defaults to WATCH_INTERVAL)
        #[arg(long, value_parser = clap::value_parser!(u64).range(30..=3600))]
        interval: Option<u64>,

        #[command(flatten)]
        extract: ExtractArgs,

        /// Output file, overwritten on each emission (stdout lines when omitted)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Emit every cycle or only when records change
        #[arg(long, value_enum, default_value_t = EmitMode::Always)]
        emit: EmitMode,

        /// Stop after this many cycles
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_cycles: Option<u64>,
    },

    /// Check connectivity to the worksheet
    Health {
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Row selection shared by `run` and `watch`
#[derive(Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// Filter expression, e.g. "status=ACTIVE,title_contains=intro"
    #[arg(long)]
    pub filter: Option<String>,

    /// Comma-separated columns to include, in output order
    #[arg(long)]
    pub columns: Option<String>,

    /// Maximum number of records
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub limit: Option<u64>,
}

impl ExtractArgs {
    /// Parse the filter and column list
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::Config` for an invalid filter or column list.
    pub fn to_request(&self) -> Result<ExtractionRequest> {
        let filter = match &self.filter {
            Some(expr) => FilterExpression::parse(expr)?,
            None => FilterExpression::default(),
        };
        let columns = self.columns.as_deref().map(parse_columns).transpose()?;
        let limit = self
            .limit
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX));

        Ok(ExtractionRequest {
            filter,
            columns,
            limit,
        })
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging configuration selected by the global flags
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            level: self.log_level,
            file: self.log_file.clone(),
            console: !self.no_console,
            json: self.json_logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetsError;

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::try_parse_from(["sheets-reader", "run"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.no_console);
        match cli.command {
            Commands::Run { extract, out } => {
                assert!(extract.filter.is_none());
                assert!(out.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_options() {
        let cli = Cli::try_parse_from([
            "sheets-reader",
            "run",
            "--filter",
            "status=ACTIVE",
            "--columns",
            "title,status",
            "--limit",
            "5",
            "--out",
            "results.json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run { extract, out } => {
                assert_eq!(extract.filter.as_deref(), Some("status=ACTIVE"));
                assert_eq!(extract.limit, Some(5));
                assert_eq!(out, Some(PathBuf::from("results.json")));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_log_level_case_insensitive_and_global() {
        let cli = Cli::try_parse_from(["sheets-reader", "health", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);

        let cli =
            Cli::try_parse_from(["sheets-reader", "--log-level", "WARNING", "health"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Warning);
    }

    #[test]
    fn test_cli_rejects_bad_log_level() {
        assert!(Cli::try_parse_from(["sheets-reader", "--log-level", "TRACE", "run"]).is_err());
    }

    #[test]
    fn test_cli_rejects_zero_limit() {
        let err = Cli::try_parse_from(["sheets-reader", "run", "--limit", "0"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_cli_parse_watch() {
        let cli = Cli::try_parse_from([
            "sheets-reader",
            "watch",
            "--interval",
            "60",
            "--emit",
            "changed",
            "--max-cycles",
            "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Watch {
                interval,
                emit,
                max_cycles,
                ..
            } => {
                assert_eq!(interval, Some(60));
                assert_eq!(emit, EmitMode::Changed);
                assert_eq!(max_cycles, Some(3));
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_cli_rejects_short_interval() {
        assert!(Cli::try_parse_from(["sheets-reader", "watch", "--interval", "5"]).is_err());
    }

    #[test]
    fn test_log_options() {
        let cli = Cli::try_parse_from([
            "sheets-reader",
            "--no-console",
            "--json-logs",
            "--log-file",
            "app.log",
            "health",
        ])
        .unwrap();
        let options = cli.log_options();
        assert!(!options.console);
        assert!(options.json);
        assert_eq!(options.file, Some(PathBuf::from("app.log")));
    }

    #[test]
    fn test_extract_args_to_request() {
        let args = ExtractArgs {
            filter: Some("status_in=A|B".to_string()),
            columns: Some("title, status".to_string()),
            limit: Some(2),
        };
        let request = args.to_request().unwrap();
        assert_eq!(request.filter.clauses().len(), 1);
        assert_eq!(
            request.columns,
            Some(vec!["title".to_string(), "status".to_string()])
        );
        assert_eq!(request.limit, Some(2));
    }

    #[test]
    fn test_extract_args_bad_filter_is_config_error() {
        let args = ExtractArgs {
            filter: Some("status".to_string()),
            ..Default::default()
        };
        assert!(matches!(args.to_request(), Err(SheetsError::Config(_))));
    }
}
