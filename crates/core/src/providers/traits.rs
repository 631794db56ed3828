use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::CoreError;
use crate::models::price::PricePoint;
use crate::models::timeframe::HistoryInterval;

/// Trait abstraction for the external quote API.
///
/// Both calls are fallible, latency-bearing and count against the caller's
/// rate budget. Implementations never retry on their own; the scheduler
/// decides when a symbol is asked for again.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Human-readable name of this source (for logs/errors).
    fn name(&self) -> &str;

    /// Latest price of a symbol.
    async fn fetch_quote(&self, symbol: &str) -> Result<PricePoint, CoreError>;

    /// Price history from `start` up to now, sampled at `interval`.
    /// Order of the returned points is not guaranteed.
    async fn fetch_historical(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        interval: HistoryInterval,
    ) -> Result<Vec<PricePoint>, CoreError>;
}
