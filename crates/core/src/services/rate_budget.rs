use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::CoreError;
use crate::models::fetch::RequestStatus;
use crate::models::settings::RateBudgetConfig;
use crate::models::ticker::WatchlistKey;
use crate::services::timing::Clock;
use crate::storage::usage_store::{UsageSnapshot, UsageStore};

/// Daily quota of quote-source calls shared by every watchlist.
///
/// The window starts at `reset_time` in `timezone` and lasts until the same
/// wall-clock time on the next day. Within a window the counter only grows.
/// A reset happens at most once per window crossing: the stored
/// `window_start` is moved forward on the first check after the boundary,
/// and every later check in the same window sees it as current.
///
/// All mutation goes through one mutex, so concurrent jobs for different
/// watchlists can never claim the same remaining calls twice.
pub struct RateBudget {
    limit: u32,
    reset_time: NaiveTime,
    tz: Tz,
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<UsageSnapshot>,
}

impl std::fmt::Debug for RateBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateBudget")
            .field("limit", &self.limit)
            .field("reset_time", &self.reset_time)
            .field("tz", &self.tz)
            .field("used", &self.lock_state().used)
            .finish()
    }
}

impl RateBudget {
    /// Build the budget and restore the persisted counter, if any.
    pub fn new(
        config: &RateBudgetConfig,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let reset_time = config.reset_clock()?;
        let tz = config.tz()?;
        let window = window_start_at(tz, reset_time, clock.now());

        let restored = match store.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Could not restore rate budget usage, starting from zero: {e}");
                None
            }
        };

        let budget = Self {
            limit: config.daily_limit,
            reset_time,
            tz,
            store,
            clock,
            state: Mutex::new(restored.unwrap_or_else(|| UsageSnapshot::empty(window))),
        };

        // A counter restored from a previous day must not leak into today.
        {
            let mut state = budget.lock_state();
            if budget.roll_window(&mut state) {
                budget.persist(&state);
            }
        }

        Ok(budget)
    }

    /// Claim up to `n` calls for `key`. Returns how many may be issued now.
    ///
    /// The returned amount is already counted as used.
    pub fn reserve(&self, key: &WatchlistKey, n: u32) -> u32 {
        let mut state = self.lock_state();
        let rolled = self.roll_window(&mut state);

        let remaining = self.limit.saturating_sub(state.used);
        let allowed = n.min(remaining);

        if allowed > 0 {
            state.used += allowed;
            *state.per_watchlist.entry(key.to_string()).or_insert(0) += allowed;
        }
        if allowed > 0 || rolled {
            self.persist(&state);
        }
        if allowed < n {
            info!(
                "Rate budget exhausted for {key}: {allowed} of {n} calls allowed ({}/{} used)",
                state.used, self.limit
            );
        }

        allowed
    }

    /// Account for calls issued outside `reserve` (e.g., one-off lookups).
    pub fn record_used(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut state = self.lock_state();
        self.roll_window(&mut state);
        state.used = state.used.saturating_add(n);
        self.persist(&state);
    }

    /// Usage as seen by `key`. Read-only: a pending window reset is reported
    /// as zero usage but not written back.
    #[must_use]
    pub fn status(&self, key: &WatchlistKey) -> RequestStatus {
        let now = self.clock.now();
        let window = window_start_at(self.tz, self.reset_time, now);
        let state = self.lock_state();

        let (total_used, current) = if state.window_start < window {
            (0, 0)
        } else {
            (
                state.used,
                state.per_watchlist.get(key.as_str()).copied().unwrap_or(0),
            )
        };

        RequestStatus {
            current,
            limit: self.limit,
            total_used,
            remaining: self.limit.saturating_sub(total_used),
            resets_at: next_reset_after(self.tz, self.reset_time, window),
        }
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Calls left in the current window (read-only, like `status`).
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let window = window_start_at(self.tz, self.reset_time, self.clock.now());
        let state = self.lock_state();
        if state.window_start < window {
            self.limit
        } else {
            self.limit.saturating_sub(state.used)
        }
    }

    // ── Internal ────────────────────────────────────────────────────

    fn lock_state(&self) -> MutexGuard<'_, UsageSnapshot> {
        // The counter stays meaningful even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `true` if the window was reset.
    fn roll_window(&self, state: &mut UsageSnapshot) -> bool {
        let window = window_start_at(self.tz, self.reset_time, self.clock.now());
        if state.window_start >= window {
            return false;
        }
        info!(
            "Rate budget window reset at {window} ({} calls used in the previous window)",
            state.used
        );
        *state = UsageSnapshot::empty(window);
        true
    }

    fn persist(&self, state: &UsageSnapshot) {
        if let Err(e) = self.store.save(state) {
            warn!("Failed to persist rate budget usage: {e}");
        }
    }
}

/// Most recent reset instant at or before `now`.
fn window_start_at(tz: Tz, reset_time: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();
    let todays_reset = local_instant(tz, today, reset_time);
    if now >= todays_reset {
        todays_reset
    } else {
        let yesterday = today.pred_opt().unwrap_or(today);
        local_instant(tz, yesterday, reset_time)
    }
}

fn next_reset_after(tz: Tz, reset_time: NaiveTime, window_start: DateTime<Utc>) -> DateTime<Utc> {
    let day = window_start.with_timezone(&tz).date_naive();
    let next = day.succ_opt().unwrap_or(day);
    local_instant(tz, next, reset_time)
}

/// Wall-clock `time` on `date` in `tz`, resolved across DST transitions:
/// ambiguous times take the earlier instant, skipped times shift forward an hour.
fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz.from_local_datetime(&(naive + Duration::hours(1))).earliest(),
    };
    local
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}
