use async_trait::async_trait;
use chrono::{DateTime, Utc};
use time::OffsetDateTime;

use crate::errors::CoreError;
use crate::models::price::PricePoint;
use crate::models::timeframe::HistoryInterval;
use super::traits::QuoteSource;

const PROVIDER: &str = "Yahoo Finance";

/// Yahoo Finance quote source.
///
/// - **Free**: No API key required.
/// - **No strict rate limits** (unofficial public API); the core's rate
///   budget still applies.
/// - **Data**: Real-time quotes + intraday and daily OHLCV history.
pub struct YahooFinanceProvider {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooFinanceProvider {
    /// Bar size for the latest-quote request. The connector asks for a
    /// one-month range, which Yahoo refuses for 1-minute bars.
    pub const QUOTE_INTERVAL: &'static str = "1d";

    pub fn new() -> Result<Self, CoreError> {
        let connector = yahoo_finance_api::YahooConnector::new()
            .map_err(|e| api_error(format!("Failed to create connector: {e}")))?;
        Ok(Self { connector })
    }

    fn to_offset_datetime(at: DateTime<Utc>) -> Result<OffsetDateTime, CoreError> {
        OffsetDateTime::from_unix_timestamp(at.timestamp())
            .map_err(|e| api_error(format!("Invalid timestamp {at}: {e}")))
    }

    fn to_price_point(quote: &yahoo_finance_api::Quote) -> Option<PricePoint> {
        let timestamp = DateTime::from_timestamp(quote.timestamp as i64, 0)?;
        Some(PricePoint::new(timestamp, quote.close).with_bar(quote.high, quote.low, quote.volume))
    }
}

fn api_error(message: String) -> CoreError {
    CoreError::Api {
        provider: PROVIDER.into(),
        message,
    }
}

#[async_trait]
impl QuoteSource for YahooFinanceProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PricePoint, CoreError> {
        let resp = self
            .connector
            .get_latest_quotes(symbol, Self::QUOTE_INTERVAL)
            .await
            .map_err(|e| api_error(format!("Failed to fetch latest quote for {symbol}: {e}")))?;

        let quote = resp
            .last_quote()
            .map_err(|e| api_error(format!("No quote data for {symbol}: {e}")))?;

        Self::to_price_point(&quote).ok_or_else(|| CoreError::PriceNotAvailable {
            symbol: symbol.to_string(),
            date: "latest".to_string(),
        })
    }

    async fn fetch_historical(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        interval: HistoryInterval,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let from = Self::to_offset_datetime(start)?;
        let to = Self::to_offset_datetime(Utc::now())?;

        let resp = self
            .connector
            .get_quote_history_interval(symbol, from, to, interval.as_yahoo_str())
            .await
            .map_err(|e| api_error(format!("Failed to fetch history for {symbol}: {e}")))?;

        let quotes = resp
            .quotes()
            .map_err(|e| api_error(format!("Failed to parse quotes for {symbol}: {e}")))?;

        Ok(quotes
            .iter()
            .filter_map(Self::to_price_point)
            .filter(|p| p.timestamp >= start)
            .collect())
    }
}
