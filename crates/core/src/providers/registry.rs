use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::price::PricePoint;
use crate::models::timeframe::HistoryInterval;

use super::alphavantage::AlphaVantageProvider;
use super::traits::QuoteSource;
use super::yahoo_finance::YahooFinanceProvider;

/// Ordered list of quote sources with automatic fallback.
///
/// The registry is itself a `QuoteSource`: each call tries the sources in
/// registration order and returns the first success. If every source fails,
/// the last error is returned.
pub struct QuoteSourceRegistry {
    sources: Vec<Box<dyn QuoteSource>>,
}

impl QuoteSourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Create a registry with all default sources pre-configured.
    pub fn new_with_defaults(api_keys: &HashMap<String, String>) -> Self {
        let mut registry = Self::new();

        // Yahoo Finance: no API key needed (primary)
        match YahooFinanceProvider::new() {
            Ok(yahoo) => registry.register(Box::new(yahoo)),
            Err(e) => warn!("Yahoo Finance source unavailable: {e}"),
        }

        // Alpha Vantage: requires API key (fallback)
        if let Some(key) = api_keys.get("alphavantage") {
            registry.register(Box::new(AlphaVantageProvider::new(key.clone())));
        }

        registry
    }

    /// Register a new quote source at the lowest priority.
    pub fn register(&mut self, source: Box<dyn QuoteSource>) {
        self.sources.push(source);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Names of the registered sources, in priority order.
    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }
}

impl Default for QuoteSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for QuoteSourceRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PricePoint, CoreError> {
        let mut last_error = None;
        for source in &self.sources {
            match source.fetch_quote(symbol).await {
                Ok(point) if point.is_usable() => return Ok(point),
                Ok(point) => {
                    last_error = Some(CoreError::InvalidPrice {
                        symbol: symbol.to_string(),
                        price: point.price,
                    });
                }
                Err(e) => {
                    debug!("{} failed to quote {symbol}: {e}", source.name());
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider(symbol.to_string())))
    }

    async fn fetch_historical(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        interval: HistoryInterval,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let mut last_error = None;
        for source in &self.sources {
            match source.fetch_historical(symbol, start, interval).await {
                Ok(points) => return Ok(points),
                Err(e) => {
                    debug!("{} failed to load history for {symbol}: {e}", source.name());
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider(symbol.to_string())))
    }
}
