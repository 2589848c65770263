//! Watch mode
//!
//! Polls the worksheet on a jittered interval, retries transient failures
//! with exponential backoff and hands each result to a [`Sink`].
//!
//! # Modules
//!
//! - [`backoff`]: retry delays and interval jitter
//! - [`clock`]: injectable time source
//! - [`sink`]: result destinations

pub mod backoff;
pub mod clock;
pub mod sink;
#[allow(clippy::module_inception)]
mod watcher;

pub use backoff::{jittered, RetryPolicy};
pub use clock::{Clock, FakeClock, TokioClock};
pub use sink::{JsonSink, MemorySink, Sink};
pub use watcher::{EmitMode, WatchOptions, WatchState, WatchSummary, Watcher};
