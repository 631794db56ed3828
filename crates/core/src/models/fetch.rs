use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ticker::TickerItem;
use super::timeframe::Timeframe;

/// Lifecycle state of a watchlist's fetch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FetchStatus {
    /// No job registered for the watchlist
    #[default]
    Idle,
    /// Timers armed, batches executing
    Active,
    /// Timers stopped; items and progress retained for `resume`
    Paused,
    /// Single pass finished (only when no refresh interval is configured)
    Completed,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::Idle => write!(f, "Idle"),
            FetchStatus::Active => write!(f, "Active"),
            FetchStatus::Paused => write!(f, "Paused"),
            FetchStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// Progress reported after every batch execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FetchProgress {
    /// Distinct tickers refreshed so far in the current pass (≤ `total_tickers`)
    pub tickers_fetched: usize,
    /// Real tickers the job is responsible for
    pub total_tickers: usize,
    /// Tickers refreshed by this batch alone
    pub batch_fetched: usize,
    pub batch_index: usize,
    pub total_batches: usize,
    /// The rate budget refused some or all of this batch's calls
    pub rate_limited: bool,
}

/// Callback receiving the merged item list after each batch.
///
/// The receiver owns persistence of the items (and of the refresh timestamp).
pub type ProgressCallback = Arc<dyn Fn(Vec<TickerItem>, FetchProgress) + Send + Sync>;

/// Flags accompanying a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOptions {
    /// Triggered by the user rather than by an automatic refresh
    pub manual: bool,
    /// Skip the market-hours gate
    pub bypass_market_closed: bool,
    pub timeframe: Timeframe,
}

impl FetchOptions {
    pub fn manual(timeframe: Timeframe) -> Self {
        Self {
            manual: true,
            bypass_market_closed: false,
            timeframe,
        }
    }

    pub fn automatic(timeframe: Timeframe) -> Self {
        Self {
            manual: false,
            bypass_market_closed: false,
            timeframe,
        }
    }

    pub fn bypassing_market_hours(mut self) -> Self {
        self.bypass_market_closed = true;
        self
    }
}

/// Why a start request did not start a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartRejection {
    AlreadyInProgress,
    MarketClosed,
    NothingToFetch,
    NoRuntime,
    /// `resume` on a job that is not paused
    NotPaused,
}

/// Answer to a start request: `{success, message?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<StartRejection>,
}

impl StartOutcome {
    pub fn started(message: Option<String>) -> Self {
        Self {
            success: true,
            message,
            rejection: None,
        }
    }

    pub fn rejected(rejection: StartRejection, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            rejection: Some(rejection),
        }
    }

    #[must_use]
    pub fn is_market_closed(&self) -> bool {
        self.rejection == Some(StartRejection::MarketClosed)
    }
}

/// Read-only view of a job, for progress display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FetchStatusSnapshot {
    pub status: FetchStatus,
    pub last_progress: Option<FetchProgress>,
    pub current_batch_index: usize,
    pub total_batches: usize,
    pub timeframe: Option<Timeframe>,
}

/// Rate-budget usage as seen by one watchlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    /// Calls issued for this watchlist in the current window
    pub current: u32,
    /// Configured ceiling per window
    pub limit: u32,
    /// Calls issued across all watchlists in the current window
    pub total_used: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}
