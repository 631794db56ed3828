use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

use super::price::{sort_and_dedup, PricePoint};

/// Opaque identifier (slug) of a watchlist.
///
/// Scopes exactly one fetch job and one return curve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchlistKey(String);

impl WatchlistKey {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WatchlistKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WatchlistKey {
    fn from(slug: &str) -> Self {
        Self::new(slug)
    }
}

impl From<String> for WatchlistKey {
    fn from(slug: String) -> Self {
        Self(slug)
    }
}

/// Whether a ticker is backed by live market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TickerType {
    /// Quoted by the external API.
    #[default]
    Real,
    /// Synthetic series supplied by the application; never fetched.
    Mock,
}

impl std::fmt::Display for TickerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickerType::Real => write!(f, "real"),
            TickerType::Mock => write!(f, "mock"),
        }
    }
}

/// One symbol's position record inside a watchlist.
///
/// `buy_price`/`buy_date` are edited by the application only; the price
/// fields (`historical_data`, `current_price`, `last_updated`) are written
/// by the fetch scheduler only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerItem {
    /// Ticker symbol, uppercased (e.g., "AAPL")
    pub symbol: String,
    pub buy_price: f64,
    pub buy_date: DateTime<Utc>,
    #[serde(default)]
    pub historical_data: Vec<PricePoint>,
    #[serde(rename = "type", default)]
    pub ticker_type: TickerType,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl TickerItem {
    pub fn new(symbol: impl Into<String>, buy_price: f64, buy_date: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            buy_price,
            buy_date,
            historical_data: Vec::new(),
            ticker_type: TickerType::Real,
            current_price: None,
            last_updated: None,
        }
    }

    /// Convenience constructor for a synthetic ticker.
    pub fn mock(symbol: impl Into<String>, buy_price: f64, buy_date: DateTime<Utc>) -> Self {
        Self {
            ticker_type: TickerType::Mock,
            ..Self::new(symbol, buy_price, buy_date)
        }
    }

    pub fn with_history(mut self, points: Vec<PricePoint>) -> Self {
        self.historical_data = points;
        sort_and_dedup(&mut self.historical_data);
        self
    }

    #[must_use]
    pub fn is_real(&self) -> bool {
        self.ticker_type == TickerType::Real
    }

    /// A symbol the quote API can be asked for: non-empty, no whitespace.
    pub fn validate_symbol(&self) -> Result<(), CoreError> {
        if self.symbol.is_empty() {
            return Err(CoreError::ValidationError("Ticker symbol cannot be empty".into()));
        }
        if self.symbol.chars().any(char::is_whitespace) {
            return Err(CoreError::ValidationError(format!(
                "Ticker symbol '{}' must not contain whitespace",
                self.symbol
            )));
        }
        Ok(())
    }

    /// A non-positive or non-finite buy price excludes the item from returns.
    #[must_use]
    pub fn has_valid_buy_price(&self) -> bool {
        self.buy_price.is_finite() && self.buy_price > 0.0
    }

    /// Merge freshly fetched points into the stored series.
    ///
    /// Points with an existing timestamp replace the stored one; the series
    /// stays sorted ascending.
    pub fn merge_history(&mut self, points: impl IntoIterator<Item = PricePoint>) {
        self.historical_data.extend(points);
        sort_and_dedup(&mut self.historical_data);
    }

    /// Record the latest quote as both the current price and a series point.
    pub fn apply_quote(&mut self, quote: PricePoint) {
        self.current_price = Some(quote.price);
        self.last_updated = Some(quote.timestamp);
        self.merge_history(std::iter::once(quote));
    }

    /// Simple return of the latest quote against the buy price, if both are usable.
    #[must_use]
    pub fn current_return_percent(&self) -> Option<f64> {
        let price = self.current_price?;
        if !self.has_valid_buy_price() || !price.is_finite() || price <= 0.0 {
            return None;
        }
        Some((price - self.buy_price) / self.buy_price * 100.0)
    }
}
