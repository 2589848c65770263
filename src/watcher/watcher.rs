//! Polling loop for watch mode
//!
//! The loop is an explicit state machine:
//!
//! ```text
//!            start
//!              │
//!              ▼
//!   ┌──────► Fetching ──── transient error, attempts left ───► Backoff
//!   │          │                                                 │
//!   │   success / data error / attempts exhausted                │
//!   │          ▼                                                 │
//!   └──────── Idle                       Fetching ◄── delay ─────┘
//! ```
//!
//! Authentication and configuration errors stop the loop. Cancellation ends
//! Idle and Backoff waits and prevents the next fetch, but a fetch already in
//! flight always completes.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::{jittered, RetryPolicy};
use super::clock::Clock;
use super::sink::Sink;
use crate::error::Result;
use crate::extract::{extract, ExtractionRequest};
use crate::logging::mask_sensitive;
use crate::model::ExtractionResult;
use crate::sheets::SheetSource;

/// When a successful cycle produces output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum EmitMode {
    /// Every successful cycle
    #[default]
    Always,
    /// Only when the records differ from the last emitted set
    Changed,
}

/// Timing and emission settings of the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Base wait between cycles
    pub interval: Duration,
    /// Random spread applied to `interval`, in percent
    pub jitter_percent: u8,
    /// Attempts and backoff within a cycle
    pub retry: RetryPolicy,
    pub emit: EmitMode,
    /// Stop after this many completed cycles
    pub max_cycles: Option<u64>,
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Waiting for the next tick
    Idle,
    /// Extraction in progress; `attempt` is 1-based
    Fetching { attempt: u32 },
    /// Waiting before retrying after failed `attempt`
    Backoff { attempt: u32, delay: Duration },
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Cycles that ran to completion, successful or not
    pub cycles: u64,
    /// Results handed to the sink
    pub emitted: u64,
    /// Cycles that ended without a result
    pub failed: u64,
}

/// Periodically extracts from a worksheet until cancelled
pub struct Watcher<C, R> {
    source: Arc<dyn SheetSource>,
    request: ExtractionRequest,
    options: WatchOptions,
    clock: C,
    rng: R,
    cancel: CancellationToken,
    last_digest: Option<String>,
}

impl<C: Clock, R: Rng> Watcher<C, R> {
    /// Create a watcher
    ///
    /// # Arguments
    ///
    /// * `source` - Worksheet to poll
    /// * `request` - Filter, projection and limit applied each cycle
    /// * `options` - Interval, jitter, retry and emission settings
    /// * `clock` - Time source for every wait
    /// * `rng` - Jitter source
    /// * `cancel` - Token that stops the loop
    pub fn new(
        source: Arc<dyn SheetSource>,
        request: ExtractionRequest,
        options: WatchOptions,
        clock: C,
        rng: R,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            request,
            options,
            clock,
            rng,
            cancel,
            last_digest: None,
        }
    }

    /// Run until cancelled, `max_cycles` is reached, or a fatal error occurs
    ///
    /// The first fetch starts immediately.
    ///
    /// # Errors
    ///
    /// Returns authentication and configuration errors from a cycle. A
    /// failed write to the sink only fails that cycle.
    pub async fn run(&mut self, sink: &mut dyn Sink) -> Result<WatchSummary> {
        info!(
            interval_secs = self.options.interval.as_secs(),
            jitter_percent = self.options.jitter_percent,
            max_attempts = self.options.retry.max_attempts,
            emit = ?self.options.emit,
            filter = %self.request.filter.summary(),
            "Starting watch loop"
        );

        let mut summary = WatchSummary::default();
        let mut state = WatchState::Fetching { attempt: 1 };

        loop {
            state = match state {
                WatchState::Idle => {
                    if self
                        .options
                        .max_cycles
                        .is_some_and(|max| summary.cycles >= max)
                    {
                        info!(cycles = summary.cycles, "Reached cycle limit");
                        break;
                    }

                    let delay = jittered(
                        self.options.interval,
                        self.options.jitter_percent,
                        &mut self.rng,
                    );
                    debug!(
                        next_in_ms = delay.as_millis() as u64,
                        "Waiting for next cycle"
                    );
                    if !self.wait(delay).await {
                        break;
                    }
                    WatchState::Fetching { attempt: 1 }
                }

                WatchState::Fetching { attempt } => {
                    if self.cancel.is_cancelled() {
                        break;
                    }

                    match extract(self.source.as_ref(), &self.request).await {
                        Ok(result) => {
                            summary.cycles += 1;
                            match self.emit(&result, sink) {
                                Ok(true) => summary.emitted += 1,
                                Ok(false) => {}
                                Err(e) => {
                                    summary.failed += 1;
                                    warn!(
                                        error = %mask_sensitive(&e.to_string()),
                                        "Failed to write results, skipping cycle"
                                    );
                                }
                            }
                            WatchState::Idle
                        }
                        Err(e) if e.is_fatal() => {
                            error!(error = %mask_sensitive(&e.to_string()), "Stopping watch loop");
                            return Err(e);
                        }
                        Err(e)
                            if e.is_retryable()
                                && self.options.retry.allows_retry_after(attempt) =>
                        {
                            let delay = self.options.retry.delay_after(attempt);
                            warn!(
                                attempt,
                                max_attempts = self.options.retry.max_attempts,
                                retry_in_ms = delay.as_millis() as u64,
                                error = %mask_sensitive(&e.to_string()),
                                "Fetch failed, backing off"
                            );
                            WatchState::Backoff { attempt, delay }
                        }
                        Err(e) => {
                            summary.cycles += 1;
                            summary.failed += 1;
                            let message = mask_sensitive(&e.to_string());
                            if e.is_retryable() {
                                error!(
                                    attempts = attempt,
                                    error = %message,
                                    "Fetch failed after all attempts"
                                );
                            } else {
                                warn!(error = %message, "Skipping cycle");
                            }
                            WatchState::Idle
                        }
                    }
                }

                WatchState::Backoff { attempt, delay } => {
                    if !self.wait(delay).await {
                        break;
                    }
                    WatchState::Fetching {
                        attempt: attempt + 1,
                    }
                }
            };
        }

        info!(
            cycles = summary.cycles,
            emitted = summary.emitted,
            failed = summary.failed,
            "Watch loop stopped"
        );
        Ok(summary)
    }

    /// Wait for `delay`; false if cancelled first
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("Cancellation requested");
                false
            }
            _ = self.clock.sleep(delay) => true,
        }
    }

    /// Hand the result to the sink unless suppressed; true if emitted
    fn emit(&mut self, result: &ExtractionResult, sink: &mut dyn Sink) -> Result<bool> {
        if self.options.emit == EmitMode::Changed {
            let digest = records_digest(result)?;
            if self.last_digest.as_deref() == Some(digest.as_str()) {
                debug!(count = result.count, "Records unchanged, not emitting");
                return Ok(false);
            }
            sink.emit(result)?;
            self.last_digest = Some(digest);
        } else {
            sink.emit(result)?;
        }

        info!(count = result.count, "Emitted records");
        Ok(true)
    }
}

fn records_digest(result: &ExtractionResult) -> Result<String> {
    let bytes = serde_json::to_vec(&result.records)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetsError;
    use crate::filter::FilterExpression;
    use crate::model::Row;
    use crate::sheets::WorksheetMetadata;
    use crate::watcher::clock::FakeClock;
    use crate::watcher::sink::MemorySink;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Fetch = Result<Vec<Vec<String>>>;

    /// Replays scripted fetch outcomes, then keeps returning the last grid
    struct ScriptedSource {
        script: Mutex<VecDeque<Fetch>>,
        fallback: Vec<Vec<String>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Fetch>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: grid(&["a"]),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl SheetSource for ScriptedSource {
        async fn fetch_values(&self) -> Fetch {
            *self.calls.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.fallback.clone()))
        }

        async fn worksheet_metadata(&self) -> Result<WorksheetMetadata> {
            Err(SheetsError::Data("unused".to_string()))
        }
    }

    fn grid(titles: &[&str]) -> Vec<Vec<String>> {
        let mut values = vec![vec!["title".to_string()]];
        values.extend(titles.iter().map(|t| vec![t.to_string()]));
        values
    }

    fn options(max_cycles: u64, emit: EmitMode) -> WatchOptions {
        WatchOptions {
            interval: Duration::from_secs(300),
            jitter_percent: 0,
            retry: RetryPolicy::new(3, Duration::from_secs(5)),
            emit,
            max_cycles: Some(max_cycles),
        }
    }

    fn watcher(
        source: Arc<ScriptedSource>,
        options: WatchOptions,
        clock: Arc<FakeClock>,
        cancel: CancellationToken,
    ) -> Watcher<Arc<FakeClock>, StdRng> {
        Watcher::new(
            source,
            ExtractionRequest::default(),
            options,
            clock,
            StdRng::seed_from_u64(1),
            cancel,
        )
    }

    #[tokio::test]
    async fn test_backoff_then_success() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(SheetsError::Transient("timeout".to_string())),
            Err(SheetsError::Transient("HTTP 503".to_string())),
            Ok(grid(&["Opening"])),
        ]));
        let clock = Arc::new(FakeClock::new());
        let mut sink = MemorySink::default();

        let summary = watcher(
            source.clone(),
            options(1, EmitMode::Always),
            clock.clone(),
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap();

        assert_eq!(source.calls(), 3);
        assert_eq!(sink.results.len(), 1);
        assert_eq!(sink.results[0].records[0]["title"], "Opening");
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert_eq!(clock.total_slept(), Duration::from_secs(15));
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_resume_interval() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(SheetsError::Transient("1".to_string())),
            Err(SheetsError::Transient("2".to_string())),
            Err(SheetsError::Transient("3".to_string())),
        ]));
        let clock = Arc::new(FakeClock::new());
        let mut sink = MemorySink::default();

        let summary = watcher(
            source.clone(),
            options(2, EmitMode::Always),
            clock.clone(),
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap();

        assert_eq!(source.calls(), 4);
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(sink.results.len(), 1);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(300)
            ]
        );
    }

    #[tokio::test]
    async fn test_data_error_skips_cycle_without_retry() {
        let source = Arc::new(ScriptedSource::new(vec![Err(SheetsError::Data(
            "Worksheet is empty".to_string(),
        ))]));
        let clock = Arc::new(FakeClock::new());
        let mut sink = MemorySink::default();

        let summary = watcher(
            source.clone(),
            options(2, EmitMode::Always),
            clock.clone(),
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(sink.results.len(), 1);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(300)]);
    }

    #[tokio::test]
    async fn test_auth_error_is_fatal() {
        let source = Arc::new(ScriptedSource::new(vec![Err(
            SheetsError::Authentication("401".to_string()),
        )]));
        let clock = Arc::new(FakeClock::new());
        let mut sink = MemorySink::default();

        let err = watcher(
            source.clone(),
            options(5, EmitMode::Always),
            clock.clone(),
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap_err();

        assert!(matches!(err, SheetsError::Authentication(_)));
        assert_eq!(source.calls(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_emit_changed_suppresses_duplicates() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(grid(&["a"])),
            Ok(grid(&["a"])),
            Ok(grid(&["b"])),
        ]));
        let clock = Arc::new(FakeClock::new());
        let mut sink = MemorySink::default();

        let summary = watcher(
            source,
            options(3, EmitMode::Changed),
            clock,
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap();

        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.emitted, 2);
        let titles: Vec<&str> = sink
            .results
            .iter()
            .map(|r| r.records[0]["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_emit_always_repeats() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let mut sink = MemorySink::default();

        watcher(
            source,
            options(3, EmitMode::Always),
            Arc::new(FakeClock::new()),
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap();

        assert_eq!(sink.results.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_fetches() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = MemorySink::default();

        let summary = watcher(
            source.clone(),
            options(3, EmitMode::Always),
            Arc::new(FakeClock::new()),
            cancel,
        )
        .run(&mut sink)
        .await
        .unwrap();

        assert_eq!(source.calls(), 0);
        assert_eq!(summary, WatchSummary::default());
    }

    /// Cancels the token once it has received a result
    struct CancellingSink {
        cancel: CancellationToken,
        inner: MemorySink,
    }

    impl Sink for CancellingSink {
        fn emit(&mut self, result: &ExtractionResult) -> Result<()> {
            self.inner.emit(result)?;
            self.cancel.cancel();
            Ok(())
        }
    }

    /// Fails its first write, then records like `MemorySink`
    #[derive(Default)]
    struct FailOnceSink {
        failed: bool,
        inner: MemorySink,
    }

    impl Sink for FailOnceSink {
        fn emit(&mut self, result: &ExtractionResult) -> Result<()> {
            if !self.failed {
                self.failed = true;
                return Err(SheetsError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
            }
            self.inner.emit(result)
        }
    }

    #[tokio::test]
    async fn test_sink_failure_skips_cycle() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let clock = Arc::new(FakeClock::new());
        let mut sink = FailOnceSink::default();

        let summary = watcher(
            source.clone(),
            options(3, EmitMode::Always),
            clock.clone(),
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap();

        assert_eq!(source.calls(), 3);
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.emitted, 2);
        assert_eq!(sink.inner.results.len(), 2);
    }

    #[tokio::test]
    async fn test_changed_mode_retries_failed_write() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let clock = Arc::new(FakeClock::new());
        let mut sink = FailOnceSink::default();

        let summary = watcher(
            source.clone(),
            options(2, EmitMode::Changed),
            clock.clone(),
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.emitted, 1);
        assert_eq!(sink.inner.results.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_idle_stops_loop() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let cancel = CancellationToken::new();
        let clock = Arc::new(FakeClock::new());
        let mut sink = CancellingSink {
            cancel: cancel.clone(),
            inner: MemorySink::default(),
        };

        let mut options = options(10, EmitMode::Always);
        options.max_cycles = None;

        let summary = watcher(source.clone(), options, clock.clone(), cancel)
            .run(&mut sink)
            .await
            .unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(summary.emitted, 1);
        assert_eq!(sink.inner.results.len(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_request_applied_each_cycle() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(grid(&["keep", "drop"]))]));
        let mut sink = MemorySink::default();
        let request = ExtractionRequest {
            filter: FilterExpression::parse("title=keep").unwrap(),
            ..Default::default()
        };

        Watcher::new(
            source,
            request,
            options(1, EmitMode::Always),
            Arc::new(FakeClock::new()),
            StdRng::seed_from_u64(1),
            CancellationToken::new(),
        )
        .run(&mut sink)
        .await
        .unwrap();

        let records: &Vec<Row> = &sink.results[0].records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["title"], "keep");
    }

    #[test]
    fn test_records_digest_ignores_timestamp() {
        let mut row = Row::new();
        row.insert("a".to_string(), "1".to_string());
        let mut first = ExtractionResult::new(vec![row.clone()]);
        let second = ExtractionResult::new(vec![row]);
        first.timestamp = "2000-01-01T00:00:00.000Z".to_string();

        assert_eq!(
            records_digest(&first).unwrap(),
            records_digest(&second).unwrap()
        );
    }
}
