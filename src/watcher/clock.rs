//! Time source for the watch loop
//!
//! The loop never sleeps directly; it goes through a [`Clock`] so tests can
//! observe the requested waits without spending wall-clock time.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

/// Something that can wait
#[async_trait]
pub trait Clock: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    async fn sleep(&self, duration: Duration) {
        self.as_ref().sleep(duration).await;
    }
}

/// Real clock backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that returns immediately and records every requested wait
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use sheets_reader::watcher::{Clock, FakeClock};
///
/// # #[tokio::main]
/// # async fn main() {
/// let clock = FakeClock::new();
/// clock.sleep(Duration::from_secs(5)).await;
/// assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct FakeClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Sum of all requested waits
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}
