//! sheets-reader - Google Sheets worksheet reader CLI
//!
#![doc = "Main entry point for the sheets-reader application."]

use std::process::ExitCode;

use sheets_reader::cli::Cli;
use sheets_reader::commands;
use sheets_reader::config::Settings;
use sheets_reader::error::{SheetsError, EXIT_GENERIC};
use sheets_reader::logging::{init_logging, mask_sensitive};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    if let Err(e) = init_logging(&cli.log_options()) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::from(EXIT_GENERIC);
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => return fail(&e),
    };

    match commands::execute(cli.command, &settings).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => fail(&e),
    }
}

fn fail(error: &SheetsError) -> ExitCode {
    let code = error.exit_code();
    tracing::error!(exit_code = code, "{}", mask_sensitive(&error.to_string()));
    ExitCode::from(code)
}
