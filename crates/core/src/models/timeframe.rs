use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Chart/fetch lookback window.
///
/// Tokens are case-sensitive (`D`, `W`, `M`, `Y`, `YTD`, `MAX`); anything
/// else parses to `Max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum Timeframe {
    #[serde(rename = "D")]
    Day,
    #[serde(rename = "W")]
    Week,
    #[serde(rename = "M")]
    Month,
    #[serde(rename = "Y")]
    Year,
    #[serde(rename = "YTD")]
    YearToDate,
    #[default]
    #[serde(rename = "MAX")]
    Max,
}

impl Timeframe {
    /// Parse a timeframe token, defaulting to `Max` for unknown input.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token {
            "D" => Timeframe::Day,
            "W" => Timeframe::Week,
            "M" => Timeframe::Month,
            "Y" => Timeframe::Year,
            "YTD" => Timeframe::YearToDate,
            _ => Timeframe::Max,
        }
    }

    #[must_use]
    pub fn token(&self) -> &'static str {
        match self {
            Timeframe::Day => "D",
            Timeframe::Week => "W",
            Timeframe::Month => "M",
            Timeframe::Year => "Y",
            Timeframe::YearToDate => "YTD",
            Timeframe::Max => "MAX",
        }
    }

    pub fn all() -> [Timeframe; 6] {
        [
            Timeframe::Day,
            Timeframe::Week,
            Timeframe::Month,
            Timeframe::Year,
            Timeframe::YearToDate,
            Timeframe::Max,
        ]
    }

    /// Start of the lookback window ending at `now`. `None` for `Max` (unbounded).
    #[must_use]
    pub fn lookback_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::Day => Some(now - Duration::days(1)),
            Timeframe::Week => Some(now - Duration::days(7)),
            Timeframe::Month => Some(now.checked_sub_months(Months::new(1)).unwrap_or(now - Duration::days(30))),
            Timeframe::Year => Some(now.checked_sub_months(Months::new(12)).unwrap_or(now - Duration::days(365))),
            Timeframe::YearToDate => Utc.with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0).single(),
            Timeframe::Max => None,
        }
    }

    /// Bar interval to request from the quote source for this window.
    #[must_use]
    pub fn history_interval(&self) -> HistoryInterval {
        match self {
            Timeframe::Day => HistoryInterval::FiveMinutes,
            Timeframe::Week => HistoryInterval::ThirtyMinutes,
            Timeframe::Month => HistoryInterval::OneHour,
            Timeframe::Year | Timeframe::YearToDate | Timeframe::Max => HistoryInterval::OneDay,
        }
    }

    /// First instant of history worth requesting for a position bought at `buy_date`.
    #[must_use]
    pub fn history_start(&self, now: DateTime<Utc>, buy_date: DateTime<Utc>) -> DateTime<Utc> {
        self.lookback_start(now).unwrap_or(buy_date)
    }
}

impl std::str::FromStr for Timeframe {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Timeframe::parse(s))
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(Timeframe::parse(&token))
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Sampling interval of a historical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryInterval {
    FiveMinutes,
    ThirtyMinutes,
    OneHour,
    OneDay,
}

impl HistoryInterval {
    /// Interval string understood by Yahoo Finance.
    #[must_use]
    pub fn as_yahoo_str(&self) -> &'static str {
        match self {
            HistoryInterval::FiveMinutes => "5m",
            HistoryInterval::ThirtyMinutes => "30m",
            HistoryInterval::OneHour => "1h",
            HistoryInterval::OneDay => "1d",
        }
    }

    #[must_use]
    pub fn is_intraday(&self) -> bool {
        !matches!(self, HistoryInterval::OneDay)
    }
}

/// Where an entry's slice of history begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceAnchor {
    /// `now - lookback`, regardless of when the position was opened.
    Lookback,
    /// The position's buy date.
    BuyDate,
    /// Whichever of the two is later.
    LaterOf,
}

impl SliceAnchor {
    /// Resolve the slice start for one entry. `None` means unbounded.
    #[must_use]
    pub fn resolve(
        &self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        buy_date: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let lookback = timeframe.lookback_start(now);
        match self {
            SliceAnchor::Lookback => lookback,
            SliceAnchor::BuyDate => Some(buy_date),
            SliceAnchor::LaterOf => Some(lookback.map_or(buy_date, |start| start.max(buy_date))),
        }
    }
}

/// One value per timeframe; used for config tables keyed by timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerTimeframe<T> {
    #[serde(rename = "D")]
    pub day: T,
    #[serde(rename = "W")]
    pub week: T,
    #[serde(rename = "M")]
    pub month: T,
    #[serde(rename = "Y")]
    pub year: T,
    #[serde(rename = "YTD")]
    pub year_to_date: T,
    #[serde(rename = "MAX")]
    pub max: T,
}

impl<T> PerTimeframe<T> {
    pub fn get(&self, timeframe: Timeframe) -> &T {
        match timeframe {
            Timeframe::Day => &self.day,
            Timeframe::Week => &self.week,
            Timeframe::Month => &self.month,
            Timeframe::Year => &self.year,
            Timeframe::YearToDate => &self.year_to_date,
            Timeframe::Max => &self.max,
        }
    }
}
