use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observed price (timestamp → price, plus optional bar data).
///
/// Immutable once recorded. Series returned by quote sources may arrive
/// out of order and are sorted before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            price,
            high: None,
            low: None,
            volume: None,
        }
    }

    /// Attach high/low/volume bar data.
    pub fn with_bar(mut self, high: f64, low: f64, volume: u64) -> Self {
        self.high = Some(high);
        self.low = Some(low);
        self.volume = Some(volume);
        self
    }

    /// Only finite, strictly positive prices take part in return computation.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }

    /// Timestamp as milliseconds since the Unix epoch (the chart axis unit).
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Sort a series ascending by timestamp, keeping the last point seen for
/// duplicated timestamps.
pub fn sort_and_dedup(points: &mut Vec<PricePoint>) {
    points.sort_by_key(|p| p.timestamp);
    // dedup_by keeps the first of a run; reverse-walk so the latest arrival wins.
    points.reverse();
    points.dedup_by_key(|p| p.timestamp);
    points.reverse();
}
