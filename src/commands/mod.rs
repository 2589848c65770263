/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `run`: extract rows once
- `watch`: extract rows periodically
- `health`: check connectivity to the worksheet

Each handler returns the process exit code for a completed command; errors
propagate to `main`, which maps them to exit codes.
*/

pub mod health;
pub mod r#run;
pub mod watch;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::Commands;
use crate::config::Settings;
use crate::error::{Result, EXIT_INTERRUPTED, EXIT_OK};
use crate::sheets::{SheetSource, SheetsClient};

/// Execute a parsed command against the configured worksheet
pub async fn execute(command: Commands, settings: &Settings) -> Result<u8> {
    tracing::info!(settings = %settings.summary(), "Configuration loaded");

    match command {
        Commands::Run { extract, out } => {
            let request = extract.to_request()?;
            let client = SheetsClient::from_settings(settings)?;
            r#run::run_extraction(&client, &request, out.as_deref()).await?;
            Ok(EXIT_OK)
        }
        Commands::Watch {
            interval,
            extract,
            out,
            emit,
            max_cycles,
        } => {
            let command = watch::WatchCommand {
                interval,
                request: extract.to_request()?,
                out,
                emit,
                max_cycles,
            };
            let client: Arc<dyn SheetSource> = Arc::new(SheetsClient::from_settings(settings)?);
            watch::run_watch(client, settings, command, cancel_on_ctrl_c()).await?;
            Ok(EXIT_OK)
        }
        Commands::Health { out } => {
            health::run_health(
                || {
                    let client = SheetsClient::from_settings(settings)?;
                    Ok(Box::new(client) as Box<dyn SheetSource>)
                },
                out.as_deref(),
            )
            .await
        }
    }
}

/// Token cancelled by the first Ctrl-C; a second one exits immediately
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if handle_interrupts(tokio::signal::ctrl_c, trigger).await {
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    });
    token
}

/// Cancel `token` on the first signal; true once a second signal arrives
///
/// A signal source that fails stops listening.
async fn handle_interrupts<S, F>(mut next_signal: S, token: CancellationToken) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    tracing::info!("Interrupt received, stopping after the current cycle (Ctrl-C again to exit now)");
    token.cancel();

    if next_signal().await.is_err() {
        return false;
    }
    tracing::warn!("Second interrupt received, exiting");
    true
}
