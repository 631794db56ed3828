pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use std::sync::Arc;

use models::{
    chart::AlignedSeries,
    fetch::{FetchOptions, FetchStatusSnapshot, ProgressCallback, RequestStatus, StartOutcome},
    settings::CoreConfig,
    ticker::{TickerItem, WatchlistKey},
    timeframe::Timeframe,
};
use providers::{registry::QuoteSourceRegistry, traits::QuoteSource};
use services::{
    fetch_scheduler::FetchScheduler,
    market_hours::MarketHours,
    rate_budget::RateBudget,
    return_engine::PortfolioReturnEngine,
    timing::{Clock, SystemClock, Ticker, TokioTicker},
};
use storage::usage_store::UsageStore;

use errors::CoreError;

/// Main entry point for the Watchfolio core library.
///
/// Owns the fetch scheduler, the shared rate budget and the return engine.
/// Fetch operations return immediately and report through the progress
/// callback; they must be called from within a Tokio runtime.
#[must_use]
pub struct WatchlistCore {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    budget: Arc<RateBudget>,
    market_hours: MarketHours,
    scheduler: FetchScheduler,
    returns: PortfolioReturnEngine,
}

impl std::fmt::Debug for WatchlistCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchlistCore")
            .field("scheduler", &self.config.scheduler)
            .field("budget", &self.budget)
            .field("active_jobs", &self.scheduler.active_keys().len())
            .finish()
    }
}

impl WatchlistCore {
    /// Build a core that fetches through the default quote sources
    /// (Yahoo Finance, plus Alpha Vantage when its API key is configured).
    pub fn new(config: CoreConfig, store: Arc<dyn UsageStore>) -> Result<Self, CoreError> {
        let registry = QuoteSourceRegistry::new_with_defaults(&config.api_keys);
        if registry.is_empty() {
            return Err(CoreError::NoProvider("no quote source could be initialised".into()));
        }
        Self::with_source(config, Arc::new(registry), store)
    }

    /// Build a core around a custom quote source.
    pub fn with_source(
        config: CoreConfig,
        source: Arc<dyn QuoteSource>,
        store: Arc<dyn UsageStore>,
    ) -> Result<Self, CoreError> {
        Self::with_timing(config, source, store, Arc::new(SystemClock), Arc::new(TokioTicker))
    }

    /// Build a core with an injected wall clock and timer.
    pub fn with_timing(
        config: CoreConfig,
        source: Arc<dyn QuoteSource>,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
        ticker: Arc<dyn Ticker>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let budget = Arc::new(RateBudget::new(&config.rate_budget, store, Arc::clone(&clock))?);
        let market_hours = MarketHours::new(&config.market_hours)?;
        let scheduler = FetchScheduler::with_timing(
            config.scheduler.clone(),
            source,
            Arc::clone(&budget),
            market_hours.clone(),
            Arc::clone(&clock),
            ticker,
        )?;
        let returns = PortfolioReturnEngine::with_clock(config.aligner.clone(), Arc::clone(&clock));

        Ok(Self {
            config,
            clock,
            budget,
            market_hours,
            scheduler,
            returns,
        })
    }

    // ── Fetching ────────────────────────────────────────────────────

    /// Start the periodic fetch job for a watchlist.
    ///
    /// Returns `success: false` with a message when a job is already active,
    /// when the market is closed (repeat within the grace window to force it),
    /// or when the list holds no real tickers.
    pub fn start_fetch(
        &self,
        key: impl Into<WatchlistKey>,
        items: Vec<TickerItem>,
        on_progress: ProgressCallback,
        manual: bool,
        bypass_market_closed: bool,
        timeframe: Timeframe,
    ) -> StartOutcome {
        let options = FetchOptions {
            manual,
            bypass_market_closed,
            timeframe,
        };
        self.scheduler.start(key, items, on_progress, options)
    }

    /// Cancel the job for `key`; a no-op when there is none.
    pub fn cancel_fetch(&self, key: &WatchlistKey) -> bool {
        self.scheduler.cancel(key)
    }

    /// Stop future batches for `key` while keeping its progress.
    pub fn pause_fetch(&self, key: &WatchlistKey) -> bool {
        self.scheduler.pause(key)
    }

    /// Continue a paused job from the batch after the last one executed.
    pub fn resume_fetch(&self, key: &WatchlistKey) -> StartOutcome {
        self.scheduler.resume(key)
    }

    /// Cancel every job, e.g., before the application exits.
    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
    }

    #[must_use]
    pub fn get_fetch_status(&self, key: &WatchlistKey) -> FetchStatusSnapshot {
        self.scheduler.status(key)
    }

    #[must_use]
    pub fn get_watchlist_request_status(&self, key: &WatchlistKey) -> RequestStatus {
        self.scheduler.request_status(key)
    }

    /// Whether the configured market is open right now.
    #[must_use]
    pub fn is_market_open(&self) -> bool {
        self.market_hours.is_open(self.clock.now())
    }

    /// Account for quote-source calls the application made on its own.
    pub fn record_external_calls(&self, n: u32) {
        self.budget.record_used(n);
    }

    // ── Returns ─────────────────────────────────────────────────────

    /// Header figure: latest aggregate return for the timeframe (0 when unknown).
    #[must_use]
    pub fn snapshot_return(&self, items: &[TickerItem], timeframe: Timeframe) -> f64 {
        self.returns.snapshot_return(items, timeframe)
    }

    /// Aligned return curve for the full chart or the miniature sparkline.
    #[must_use]
    pub fn chart_series(&self, items: &[TickerItem], timeframe: Timeframe, mini: bool) -> AlignedSeries {
        self.returns.chart_series(items, timeframe, mini)
    }

    // ── Settings ────────────────────────────────────────────────────

    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}
