use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of wall-clock time (budget windows, market hours, override grace).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Timer used by the fetch scheduler for stagger and refresh delays.
///
/// Swapped out in tests so that no real time passes.
#[async_trait]
pub trait Ticker: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Timer backed by the Tokio runtime (`tokio::time::sleep`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTicker;

#[async_trait]
impl Ticker for TokioTicker {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
