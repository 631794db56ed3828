use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::fetch::{
    FetchOptions, FetchProgress, FetchStatus, FetchStatusSnapshot, ProgressCallback,
    RequestStatus, StartOutcome, StartRejection,
};
use crate::models::price::PricePoint;
use crate::models::settings::SchedulerConfig;
use crate::models::ticker::{TickerItem, WatchlistKey};
use crate::models::timeframe::{HistoryInterval, Timeframe};
use crate::providers::traits::QuoteSource;
use crate::services::market_hours::MarketHours;
use crate::services::rate_budget::RateBudget;
use crate::services::timing::{Clock, SystemClock, Ticker, TokioTicker};

/// QuoteSource calls per symbol refresh: one quote, one history request.
const CALLS_PER_SYMBOL: u32 = 2;

/// Turns "these symbols need fresh quotes" into staggered, rate-safe batches.
///
/// One job per watchlist key. A job splits the real symbols into fixed-size
/// batches; batch 0 runs immediately, batch `i` after `i × stagger`, and
/// each batch then repeats on its own `refresh_interval` cadence until the
/// job is cancelled or paused.
///
/// Batches of one job merge into the item list under a single async lock,
/// so merges never race and progress events arrive in batch order. Network
/// calls inside a batch run concurrently.
///
/// All entry points return immediately; results are delivered through the
/// job's `ProgressCallback`. The scheduler must be used from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct FetchScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    source: Arc<dyn QuoteSource>,
    budget: Arc<RateBudget>,
    market_hours: MarketHours,
    clock: Arc<dyn Clock>,
    ticker: Arc<dyn Ticker>,
    jobs: Mutex<HashMap<WatchlistKey, FetchJob>>,
    /// Last market-closed refusal per key, for the "press again" override
    closed_attempts: Mutex<HashMap<WatchlistKey, DateTime<Utc>>>,
}

struct FetchJob {
    /// Changes on every (re)arm; tasks of an older generation stop themselves.
    id: Uuid,
    status: FetchStatus,
    timeframe: Timeframe,
    batches: Vec<Vec<String>>,
    total_tickers: usize,
    current_batch_index: usize,
    completed_batches: HashSet<usize>,
    last_progress: Option<FetchProgress>,
    shared: Arc<JobShared>,
    /// Cancelled when the job is paused, replaced or removed; ends every armed timer.
    stop: CancellationToken,
}

impl Drop for FetchJob {
    fn drop(&mut self) {
        self.stop.cancel();
        self.shared.delivery.shut();
    }
}

struct JobShared {
    pass: AsyncMutex<PassState>,
    on_progress: ProgressCallback,
    delivery: Delivery,
}

/// Orders progress delivery against cancel and pause.
///
/// The callback runs while `gate` is held and only for the generation in
/// `live`. `close` clears `live` and then waits on `gate`, so once it
/// returns no further event reaches the callback. A callback that cancels
/// or pauses its own job does not wait on itself.
struct Delivery {
    live: Mutex<Option<Uuid>>,
    gate: Mutex<()>,
    deliverer: Mutex<Option<ThreadId>>,
}

impl Delivery {
    fn open(generation: Uuid) -> Self {
        Self {
            live: Mutex::new(Some(generation)),
            gate: Mutex::new(()),
            deliverer: Mutex::new(None),
        }
    }

    fn reopen(&self, generation: Uuid) {
        *lock(&self.live) = Some(generation);
    }

    /// Stop future deliveries without waiting for one in progress.
    fn shut(&self) {
        *lock(&self.live) = None;
    }

    /// Stop future deliveries and wait out one in progress.
    fn close(&self) {
        self.shut();
        if *lock(&self.deliverer) == Some(thread::current().id()) {
            return;
        }
        drop(lock(&self.gate));
    }

    /// Run `notify` if `generation` is still live; `false` if it was not.
    fn deliver(&self, generation: Uuid, notify: impl FnOnce()) -> bool {
        let _gate = lock(&self.gate);
        if *lock(&self.live) != Some(generation) {
            return false;
        }
        *lock(&self.deliverer) = Some(thread::current().id());
        notify();
        *lock(&self.deliverer) = None;
        true
    }
}

struct PassState {
    items: Vec<TickerItem>,
    /// Distinct symbols refreshed since batch 0 last ran
    fetched_this_pass: HashSet<String>,
}

/// Everything a batch needs, captured under the jobs lock.
struct BatchContext {
    shared: Arc<JobShared>,
    symbols: Vec<String>,
    timeframe: Timeframe,
    total_tickers: usize,
    total_batches: usize,
}

struct SymbolUpdate {
    quote: PricePoint,
    history: Option<Vec<PricePoint>>,
}

impl std::fmt::Debug for FetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchScheduler")
            .field("config", &self.inner.config)
            .field("jobs", &self.inner.lock_jobs().len())
            .finish()
    }
}

impl FetchScheduler {
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn QuoteSource>,
        budget: Arc<RateBudget>,
        market_hours: MarketHours,
    ) -> Result<Self, CoreError> {
        Self::with_timing(
            config,
            source,
            budget,
            market_hours,
            Arc::new(SystemClock),
            Arc::new(TokioTicker),
        )
    }

    /// Build a scheduler with an injected wall clock and timer.
    pub fn with_timing(
        config: SchedulerConfig,
        source: Arc<dyn QuoteSource>,
        budget: Arc<RateBudget>,
        market_hours: MarketHours,
        clock: Arc<dyn Clock>,
        ticker: Arc<dyn Ticker>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                config,
                source,
                budget,
                market_hours,
                clock,
                ticker,
                jobs: Mutex::new(HashMap::new()),
                closed_attempts: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Start fetching `items` for `key`.
    ///
    /// Refused (without touching any state) when a job for `key` is already
    /// active. A manual start while the market is closed is refused once;
    /// repeating it within the override grace window goes ahead. A paused or
    /// completed job for `key` is replaced.
    pub fn start(
        &self,
        key: impl Into<WatchlistKey>,
        items: Vec<TickerItem>,
        on_progress: ProgressCallback,
        options: FetchOptions,
    ) -> StartOutcome {
        let key = key.into();
        let Ok(runtime) = Handle::try_current() else {
            return StartOutcome::rejected(
                StartRejection::NoRuntime,
                "Fetching requires a running Tokio runtime",
            );
        };

        let mut jobs = self.inner.lock_jobs();
        if jobs.get(&key).is_some_and(|job| job.status == FetchStatus::Active) {
            info!("Fetch for {key} already in progress; ignoring start");
            return StartOutcome::rejected(
                StartRejection::AlreadyInProgress,
                format!("Fetch already in progress for {key}"),
            );
        }

        let now = self.inner.clock.now();
        if options.manual && !options.bypass_market_closed && !self.inner.market_hours.is_open(now) {
            if !self.inner.take_market_override(&key, now) {
                info!("Market closed; manual fetch for {key} needs confirmation");
                return StartOutcome::rejected(
                    StartRejection::MarketClosed,
                    "Market is closed. Press again to fetch anyway.",
                );
            }
            info!("Market closed; manual override for {key}");
        }

        let batches = partition_symbols(&items, self.inner.config.batch_size);
        let total_tickers: usize = batches.iter().map(Vec::len).sum();
        if batches.is_empty() {
            return StartOutcome::rejected(
                StartRejection::NothingToFetch,
                format!("No real tickers to fetch for {key}"),
            );
        }

        if let Some(old) = jobs.remove(&key) {
            info!("Replacing {} fetch job for {key}", old.status);
        }

        let total_batches = batches.len();
        let stop = CancellationToken::new();
        let job_id = Uuid::new_v4();
        let job = FetchJob {
            id: job_id,
            status: FetchStatus::Active,
            timeframe: options.timeframe,
            batches,
            total_tickers,
            current_batch_index: 0,
            completed_batches: HashSet::new(),
            last_progress: None,
            shared: Arc::new(JobShared {
                pass: AsyncMutex::new(PassState {
                    items,
                    fetched_this_pass: HashSet::new(),
                }),
                on_progress,
                delivery: Delivery::open(job_id),
            }),
            stop: stop.clone(),
        };
        jobs.insert(key.clone(), job);
        drop(jobs);

        info!(
            "Started fetch for {key}: {total_tickers} tickers in {total_batches} batches ({})",
            options.timeframe
        );
        let order: Vec<usize> = (0..total_batches).collect();
        self.inner.arm(&runtime, &key, job_id, &order, &stop);

        StartOutcome::started(Some(format!(
            "Fetching {total_tickers} tickers in {total_batches} batches"
        )))
    }

    /// Revoke all armed timers of `key`'s job and forget it.
    /// Returns `false` if there was no job (no-op).
    pub fn cancel(&self, key: &WatchlistKey) -> bool {
        let removed = self.inner.lock_jobs().remove(key);
        match removed {
            Some(job) => {
                job.shared.delivery.close();
                info!("Cancelled {} fetch job for {key}", job.status);
                true
            }
            None => false,
        }
    }

    /// Cancel every job (e.g., on shutdown).
    pub fn cancel_all(&self) {
        let drained: Vec<FetchJob> = self.inner.lock_jobs().drain().map(|(_, job)| job).collect();
        for job in &drained {
            job.shared.delivery.close();
        }
        if !drained.is_empty() {
            info!("Cancelled {} fetch jobs", drained.len());
        }
    }

    /// Stop future timer firings of `key`'s job, keeping its items and
    /// progress so that `resume` can pick up where it left off.
    /// Returns `false` if no active job exists.
    pub fn pause(&self, key: &WatchlistKey) -> bool {
        let shared = {
            let mut jobs = self.inner.lock_jobs();
            let Some(job) = jobs.get_mut(key) else {
                return false;
            };
            if job.status != FetchStatus::Active {
                return false;
            }
            job.status = FetchStatus::Paused;
            job.stop.cancel();
            job.stop = CancellationToken::new();
            info!(
                "Paused fetch for {key} after batch {}",
                job.current_batch_index
            );
            Arc::clone(&job.shared)
        };
        shared.delivery.close();
        true
    }

    /// Re-arm a paused job, starting with the batch after the last one executed.
    pub fn resume(&self, key: &WatchlistKey) -> StartOutcome {
        let Ok(runtime) = Handle::try_current() else {
            return StartOutcome::rejected(
                StartRejection::NoRuntime,
                "Fetching requires a running Tokio runtime",
            );
        };

        let mut jobs = self.inner.lock_jobs();
        let Some(job) = jobs.get_mut(key) else {
            return StartOutcome::rejected(
                StartRejection::NotPaused,
                format!("No paused fetch for {key}"),
            );
        };
        match job.status {
            FetchStatus::Paused => {}
            FetchStatus::Active => {
                return StartOutcome::rejected(
                    StartRejection::AlreadyInProgress,
                    format!("Fetch already in progress for {key}"),
                );
            }
            other => {
                return StartOutcome::rejected(
                    StartRejection::NotPaused,
                    format!("Fetch for {key} is {other}, not paused"),
                );
            }
        }

        let total_batches = job.batches.len();
        let next = if job.last_progress.is_some() {
            (job.current_batch_index + 1) % total_batches
        } else {
            job.current_batch_index
        };
        let repeating = self.inner.config.refresh_interval().is_some();
        let order: Vec<usize> = (0..total_batches)
            .map(|offset| (next + offset) % total_batches)
            .filter(|index| repeating || !job.completed_batches.contains(index))
            .collect();

        let stop = CancellationToken::new();
        job.id = Uuid::new_v4();
        job.status = FetchStatus::Active;
        job.stop = stop.clone();
        job.shared.delivery.reopen(job.id);
        let job_id = job.id;
        drop(jobs);

        info!("Resumed fetch for {key} at batch {next}");
        self.inner.arm(&runtime, key, job_id, &order, &stop);
        StartOutcome::started(Some(format!("Resumed fetch at batch {next}")))
    }

    /// Read-only snapshot of `key`'s job (`Idle` when none exists).
    #[must_use]
    pub fn status(&self, key: &WatchlistKey) -> FetchStatusSnapshot {
        let jobs = self.inner.lock_jobs();
        jobs.get(key)
            .map(|job| FetchStatusSnapshot {
                status: job.status,
                last_progress: job.last_progress,
                current_batch_index: job.current_batch_index,
                total_batches: job.batches.len(),
                timeframe: Some(job.timeframe),
            })
            .unwrap_or_default()
    }

    /// Rate-budget usage attributed to `key`.
    #[must_use]
    pub fn request_status(&self, key: &WatchlistKey) -> RequestStatus {
        self.inner.budget.status(key)
    }

    /// Keys of every job that is currently `Active`.
    #[must_use]
    pub fn active_keys(&self) -> Vec<WatchlistKey> {
        let jobs = self.inner.lock_jobs();
        let mut keys: Vec<WatchlistKey> = jobs
            .iter()
            .filter(|(_, job)| job.status == FetchStatus::Active)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl SchedulerInner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<WatchlistKey, FetchJob>> {
        lock(&self.jobs)
    }

    /// `true` if a previous refusal for `key` is recent enough to count as
    /// "press again"; otherwise remembers this refusal.
    fn take_market_override(&self, key: &WatchlistKey, now: DateTime<Utc>) -> bool {
        let mut attempts = lock(&self.closed_attempts);
        match attempts.get(key) {
            Some(&at) if now >= at && now - at <= self.config.override_grace() => {
                attempts.remove(key);
                true
            }
            _ => {
                attempts.insert(key.clone(), now);
                false
            }
        }
    }

    /// Spawn one timer task per batch. `order[k]` fires after `k × stagger`.
    fn arm(
        self: &Arc<Self>,
        runtime: &Handle,
        key: &WatchlistKey,
        job_id: Uuid,
        order: &[usize],
        stop: &CancellationToken,
    ) {
        let stagger = self.config.stagger_interval();
        for (slot, &batch_index) in order.iter().enumerate() {
            let delay = stagger.saturating_mul(slot as u32);
            runtime.spawn(Arc::clone(self).batch_loop(
                key.clone(),
                job_id,
                batch_index,
                delay,
                stop.clone(),
            ));
        }
    }

    async fn batch_loop(
        self: Arc<Self>,
        key: WatchlistKey,
        job_id: Uuid,
        batch_index: usize,
        initial_delay: Duration,
        stop: CancellationToken,
    ) {
        if !initial_delay.is_zero() && !self.wait(initial_delay, &stop).await {
            return;
        }

        loop {
            if !self.is_live(&key, job_id) {
                return;
            }
            self.execute_batch(&key, job_id, batch_index).await;

            match self.config.refresh_interval() {
                Some(every) => {
                    if !self.wait(every, &stop).await {
                        return;
                    }
                }
                None => {
                    self.finish_batch(&key, job_id, batch_index);
                    return;
                }
            }
        }
    }

    /// Sleep for `duration`; `false` if the job's timers were revoked first.
    async fn wait(&self, duration: Duration, stop: &CancellationToken) -> bool {
        tokio::select! {
            _ = stop.cancelled() => false,
            _ = self.ticker.sleep(duration) => true,
        }
    }

    async fn execute_batch(&self, key: &WatchlistKey, job_id: Uuid, batch_index: usize) {
        let Some(ctx) = self.batch_context(key, job_id, batch_index) else {
            return;
        };

        // Single writer per watchlist; the lock is FIFO so batches merge in firing order.
        let mut pass = ctx.shared.pass.lock().await;
        if !self.is_live(key, job_id) {
            return;
        }
        if batch_index == 0 {
            pass.fetched_this_pass.clear();
        }

        let requested = ctx.symbols.len();
        let wanted = (requested as u32).saturating_mul(CALLS_PER_SYMBOL);
        let granted = self.budget.reserve(key, wanted) as usize;
        // Whole refreshes first; an odd leftover call buys one quote without history.
        let with_history = (granted / 2).min(requested);
        let quoted = (with_history + granted % 2).min(requested);
        let to_fetch = &ctx.symbols[..quoted];

        let now = self.clock.now();
        let interval = ctx.timeframe.history_interval();
        let starts: Vec<Option<DateTime<Utc>>> = to_fetch
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                if i >= with_history {
                    return None;
                }
                let buy_date = pass
                    .items
                    .iter()
                    .find(|item| &item.symbol == symbol)
                    .map_or(now, |item| item.buy_date);
                Some(ctx.timeframe.history_start(now, buy_date))
            })
            .collect();

        let results = join_all(
            to_fetch
                .iter()
                .zip(starts)
                .map(|(symbol, start)| fetch_symbol(self.source.as_ref(), symbol, start, interval)),
        )
        .await;

        if !self.is_live(key, job_id) {
            debug!("Discarding batch {batch_index} results for {key}: job no longer active");
            return;
        }

        let mut batch_fetched = 0;
        for (symbol, result) in to_fetch.iter().zip(results) {
            match result {
                Ok(update) => {
                    for item in pass.items.iter_mut().filter(|item| &item.symbol == symbol) {
                        item.apply_quote(update.quote.clone());
                        if let Some(history) = &update.history {
                            item.merge_history(history.iter().cloned());
                        }
                    }
                    pass.fetched_this_pass.insert(symbol.clone());
                    batch_fetched += 1;
                }
                Err(e) => warn!("Skipping {symbol} for {key}: {e}"),
            }
        }

        let progress = FetchProgress {
            tickers_fetched: pass.fetched_this_pass.len(),
            total_tickers: ctx.total_tickers,
            batch_fetched,
            batch_index,
            total_batches: ctx.total_batches,
            rate_limited: granted < wanted as usize,
        };

        if !self.record_progress(key, job_id, progress) {
            debug!("Discarding batch {batch_index} progress for {key}: job no longer active");
            return;
        }

        info!(
            "Batch {}/{} for {key}: {batch_fetched}/{requested} refreshed ({}/{} this pass)",
            batch_index + 1,
            ctx.total_batches,
            progress.tickers_fetched,
            progress.total_tickers
        );
        let delivered = ctx
            .shared
            .delivery
            .deliver(job_id, || (ctx.shared.on_progress)(pass.items.clone(), progress));
        if !delivered {
            debug!("Dropped batch {batch_index} progress for {key}: job stopped during delivery");
        }
    }

    fn is_live(&self, key: &WatchlistKey, job_id: Uuid) -> bool {
        self.lock_jobs()
            .get(key)
            .is_some_and(|job| job.id == job_id && job.status == FetchStatus::Active)
    }

    fn batch_context(&self, key: &WatchlistKey, job_id: Uuid, batch_index: usize) -> Option<BatchContext> {
        let jobs = self.lock_jobs();
        let job = jobs
            .get(key)
            .filter(|job| job.id == job_id && job.status == FetchStatus::Active)?;
        Some(BatchContext {
            shared: Arc::clone(&job.shared),
            symbols: job.batches.get(batch_index)?.clone(),
            timeframe: job.timeframe,
            total_tickers: job.total_tickers,
            total_batches: job.batches.len(),
        })
    }

    /// Store progress on the job; `false` if the job went away meanwhile.
    fn record_progress(&self, key: &WatchlistKey, job_id: Uuid, progress: FetchProgress) -> bool {
        let mut jobs = self.lock_jobs();
        match jobs
            .get_mut(key)
            .filter(|job| job.id == job_id && job.status == FetchStatus::Active)
        {
            Some(job) => {
                job.current_batch_index = progress.batch_index;
                job.last_progress = Some(progress);
                true
            }
            None => false,
        }
    }

    /// Single-pass mode: the job completes once every batch has run.
    fn finish_batch(&self, key: &WatchlistKey, job_id: Uuid, batch_index: usize) {
        let mut jobs = self.lock_jobs();
        let Some(job) = jobs
            .get_mut(key)
            .filter(|job| job.id == job_id && job.status == FetchStatus::Active)
        else {
            return;
        };
        job.completed_batches.insert(batch_index);
        if job.completed_batches.len() == job.batches.len() {
            job.status = FetchStatus::Completed;
            job.shared.delivery.shut();
            // The receiver owns the items now; keep only the status and progress.
            if let Ok(mut pass) = job.shared.pass.try_lock() {
                pass.items = Vec::new();
                pass.fetched_this_pass = HashSet::new();
            }
            info!("Fetch for {key} completed");
        }
    }
}

/// Unique real symbols, in item order, split into batches of `batch_size`.
fn partition_symbols(items: &[TickerItem], batch_size: usize) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    let symbols: Vec<String> = items
        .iter()
        .filter(|item| item.is_real())
        .filter(|item| match item.validate_symbol() {
            Ok(()) => true,
            Err(e) => {
                warn!("Not fetching ticker: {e}");
                false
            }
        })
        .filter(|item| seen.insert(item.symbol.clone()))
        .map(|item| item.symbol.clone())
        .collect();
    symbols
        .chunks(batch_size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

/// Quote plus, when `history_start` is given, history for one symbol. Only a
/// failed or unusable quote fails the symbol; missing history keeps the
/// stored series.
async fn fetch_symbol(
    source: &dyn QuoteSource,
    symbol: &str,
    history_start: Option<DateTime<Utc>>,
    interval: HistoryInterval,
) -> Result<SymbolUpdate, CoreError> {
    let (quote, history) = match history_start {
        Some(start) => {
            let (quote, history) = tokio::join!(
                source.fetch_quote(symbol),
                source.fetch_historical(symbol, start, interval)
            );
            (quote, Some(history))
        }
        None => (source.fetch_quote(symbol).await, None),
    };

    let quote = quote?;
    if !quote.is_usable() {
        return Err(CoreError::InvalidPrice {
            symbol: symbol.to_string(),
            price: quote.price,
        });
    }

    let history = match history {
        Some(Ok(points)) => Some(points),
        Some(Err(e)) => {
            warn!("History for {symbol} unavailable, keeping stored series: {e}");
            None
        }
        None => {
            debug!("No budget left for {symbol} history, keeping stored series");
            None
        }
    };

    Ok(SymbolUpdate { quote, history })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
