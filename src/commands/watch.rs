//! Continuous polling (`watch`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::Result;
use crate::extract::ExtractionRequest;
use crate::sheets::SheetSource;
use crate::watcher::{EmitMode, JsonSink, RetryPolicy, TokioClock, WatchOptions, WatchSummary, Watcher};

/// Command-line choices for one watch session
#[derive(Debug, Clone, Default)]
pub struct WatchCommand {
    /// Seconds between cycles; falls back to `WATCH_INTERVAL`
    pub interval: Option<u64>,
    pub request: ExtractionRequest,
    pub out: Option<PathBuf>,
    pub emit: EmitMode,
    pub max_cycles: Option<u64>,
}

impl WatchCommand {
    /// Combine the command-line choices with the loaded settings
    pub fn options(&self, settings: &Settings) -> WatchOptions {
        WatchOptions {
            interval: self
                .interval
                .map(Duration::from_secs)
                .unwrap_or(settings.watch_interval),
            jitter_percent: settings.jitter_percent,
            retry: RetryPolicy::from_settings(settings),
            emit: self.emit,
            max_cycles: self.max_cycles,
        }
    }
}

/// Poll until cancelled or the cycle limit is reached
///
/// # Errors
///
/// Returns the authentication or configuration error that stopped the
/// loop, or an output error.
pub async fn run_watch(
    source: Arc<dyn SheetSource>,
    settings: &Settings,
    command: WatchCommand,
    cancel: CancellationToken,
) -> Result<WatchSummary> {
    let options = command.options(settings);
    let mut sink = JsonSink::new(command.out.clone());
    let mut watcher = Watcher::new(
        source,
        command.request,
        options,
        TokioClock,
        StdRng::from_rng(&mut rand::rng()),
        cancel,
    );
    watcher.run(&mut sink).await
}
