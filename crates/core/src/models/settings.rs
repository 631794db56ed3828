use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::CoreError;

use super::timeframe::{PerTimeframe, SliceAnchor};

/// Complete configuration of the core. Every section has working defaults,
/// so a partial JSON document is enough to override a single value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub scheduler: SchedulerConfig,
    pub rate_budget: RateBudgetConfig,
    pub market_hours: MarketHoursConfig,
    pub aligner: AlignerConfig,

    /// Optional API keys for quote sources that require them.
    /// Keys: source name (e.g., "alphavantage").
    pub api_keys: HashMap<String, String>,
}

impl CoreConfig {
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize config: {e}")))
    }

    /// Check every section; the first problem found is returned.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.scheduler.validate()?;
        self.rate_budget.reset_clock()?;
        self.rate_budget.tz()?;
        self.market_hours.tz()?;
        self.market_hours.open_clock()?;
        self.market_hours.close_clock()?;
        self.aligner.validate()
    }
}

// ── Scheduler ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Symbols per batch
    pub batch_size: usize,
    /// Offset between the first executions of consecutive batches
    pub stagger_interval_secs: u64,
    /// Cadence at which each batch repeats; `None` runs a single pass
    pub refresh_interval_secs: Option<u64>,
    /// A second manual start within this window overrides the market-closed gate
    pub override_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            stagger_interval_secs: 15,
            refresh_interval_secs: Some(300),
            override_grace_secs: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn stagger_interval(&self) -> Duration {
        Duration::from_secs(self.stagger_interval_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }

    pub fn override_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.override_grace_secs as i64)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.batch_size == 0 {
            return Err(CoreError::Config("batch_size must be at least 1".into()));
        }
        if self.refresh_interval_secs == Some(0) {
            return Err(CoreError::Config(
                "refresh_interval_secs must be positive (use null for a single pass)".into(),
            ));
        }
        Ok(())
    }
}

// ── Rate budget ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateBudgetConfig {
    /// Maximum quote-source calls per window
    pub daily_limit: u32,
    /// Wall-clock time ("HH:MM") at which the window resets
    pub reset_time: String,
    /// IANA time zone the reset time is expressed in
    pub timezone: String,
}

impl Default for RateBudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit: 500,
            reset_time: "00:00".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

impl RateBudgetConfig {
    pub fn reset_clock(&self) -> Result<NaiveTime, CoreError> {
        parse_clock(&self.reset_time)
    }

    pub fn tz(&self) -> Result<Tz, CoreError> {
        parse_tz(&self.timezone)
    }
}

// ── Market hours ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketHoursConfig {
    pub timezone: String,
    /// Opening time ("HH:MM"), inclusive
    pub open: String,
    /// Closing time ("HH:MM"), exclusive
    pub close: String,
    pub weekdays_only: bool,
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            open: "09:30".to_string(),
            close: "16:00".to_string(),
            weekdays_only: true,
        }
    }
}

impl MarketHoursConfig {
    pub fn tz(&self) -> Result<Tz, CoreError> {
        parse_tz(&self.timezone)
    }

    pub fn open_clock(&self) -> Result<NaiveTime, CoreError> {
        parse_clock(&self.open)
    }

    pub fn close_clock(&self) -> Result<NaiveTime, CoreError> {
        parse_clock(&self.close)
    }
}

// ── Aligner ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Point cap for the full chart
    pub full_cap: usize,
    /// Point cap for sparklines
    pub mini_cap: usize,
    /// Downsampled sets at or below this size skip the minimum-gap filter
    pub sparse_threshold: usize,
    /// Below this many points the raw axis is used instead
    pub min_points: usize,
    /// Minimum spacing between emitted points, in seconds
    pub min_gap_secs: PerTimeframe<i64>,
    /// Where each entry's slice starts
    pub anchors: PerTimeframe<SliceAnchor>,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            full_cap: 150,
            mini_cap: 40,
            sparse_threshold: 5,
            min_points: 3,
            min_gap_secs: PerTimeframe {
                day: 5 * 60,
                week: 30 * 60,
                month: 60 * 60,
                year: 24 * 60 * 60,
                year_to_date: 24 * 60 * 60,
                max: 24 * 60 * 60,
            },
            anchors: PerTimeframe {
                day: SliceAnchor::Lookback,
                week: SliceAnchor::Lookback,
                month: SliceAnchor::LaterOf,
                year: SliceAnchor::LaterOf,
                year_to_date: SliceAnchor::LaterOf,
                max: SliceAnchor::BuyDate,
            },
        }
    }
}

impl AlignerConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.full_cap < 2 || self.mini_cap < 2 {
            return Err(CoreError::Config(
                "point caps must be at least 2 (first and last timestamp)".into(),
            ));
        }
        Ok(())
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn parse_clock(value: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| CoreError::Config(format!("Invalid time of day '{value}': {e}")))
}

fn parse_tz(value: &str) -> Result<Tz, CoreError> {
    value
        .parse::<Tz>()
        .map_err(|e| CoreError::Config(format!("Invalid time zone '{value}': {e}")))
}
