use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::price::{sort_and_dedup, PricePoint};
use crate::models::timeframe::HistoryInterval;
use super::traits::QuoteSource;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";

/// Alpha Vantage quote source.
///
/// - **Free tier**: 25 requests/day (across ALL endpoints).
/// - **Requires**: API key (set via config as "alphavantage").
/// - **Coverage**: 100k+ global equity symbols.
///
/// When the daily quota is exhausted the API answers 200 with a "Note" or
/// "Information" field instead of data; that is surfaced as
/// `CoreError::RateLimited`.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
        }
    }

    /// Parse a `TIME_SERIES_*` response body into price points at or after `start`.
    ///
    /// The series object's key varies by function ("Time Series (Daily)",
    /// "Time Series (5min)", …), so it is located by prefix.
    pub fn parse_time_series(
        symbol: &str,
        body: &Value,
        start: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, CoreError> {
        check_quota(body)?;

        let series = body
            .as_object()
            .and_then(|obj| {
                obj.iter()
                    .find(|(key, _)| key.starts_with("Time Series"))
                    .map(|(_, v)| v)
            })
            .and_then(Value::as_object)
            .ok_or_else(|| api_error(format!("No time series data for {symbol}")))?;

        let mut points: Vec<PricePoint> = series
            .iter()
            .filter_map(|(stamp, bar)| {
                let timestamp = parse_stamp(stamp)?;
                if timestamp < start {
                    return None;
                }
                let close = field_f64(bar, "4. close")?;
                let mut point = PricePoint::new(timestamp, close);
                point.high = field_f64(bar, "2. high");
                point.low = field_f64(bar, "3. low");
                point.volume = bar
                    .get("5. volume")
                    .and_then(Value::as_str)
                    .and_then(|v| v.parse().ok());
                Some(point)
            })
            .collect();

        sort_and_dedup(&mut points);
        Ok(points)
    }

    /// Parse a `GLOBAL_QUOTE` response body.
    pub fn parse_global_quote(symbol: &str, body: &Value) -> Result<PricePoint, CoreError> {
        check_quota(body)?;

        let resp: GlobalQuoteResponse = serde_json::from_value(body.clone())?;
        let quote = resp
            .global_quote
            .ok_or_else(|| api_error(format!("No quote data for {symbol}")))?;

        let price: f64 = quote
            .price
            .as_deref()
            .ok_or_else(|| api_error(format!("Quote for {symbol} has no price")))?
            .parse()
            .map_err(|e| api_error(format!("Invalid price format for {symbol}: {e}")))?;

        // The endpoint only reports the trading day, not the tick time.
        let timestamp = quote
            .latest_trading_day
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);

        Ok(PricePoint::new(timestamp, price))
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<Value, CoreError> {
        let body = self
            .client
            .get(BASE_URL)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?
            .json::<Value>()
            .await?;
        Ok(body)
    }
}

// ── Alpha Vantage API response types ────────────────────────────────

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
}

fn api_error(message: String) -> CoreError {
    CoreError::Api {
        provider: PROVIDER.into(),
        message,
    }
}

fn check_quota(body: &Value) -> Result<(), CoreError> {
    if body.get("Note").is_some() || body.get("Information").is_some() {
        return Err(CoreError::RateLimited {
            provider: PROVIDER.into(),
        });
    }
    if let Some(msg) = body.get("Error Message").and_then(Value::as_str) {
        return Err(api_error(msg.to_string()));
    }
    Ok(())
}

fn field_f64(bar: &Value, name: &str) -> Option<f64> {
    bar.get(name)?.as_str()?.parse().ok()
}

/// Intraday keys carry a time ("2024-01-02 15:55:00"), daily keys do not.
fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

fn intraday_param(interval: HistoryInterval) -> &'static str {
    match interval {
        HistoryInterval::FiveMinutes => "5min",
        HistoryInterval::ThirtyMinutes => "30min",
        HistoryInterval::OneHour | HistoryInterval::OneDay => "60min",
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PricePoint, CoreError> {
        let symbol = symbol.to_uppercase();
        let body = self
            .get_json(&[("function", "GLOBAL_QUOTE"), ("symbol", &symbol)])
            .await?;
        Self::parse_global_quote(&symbol, &body)
    }

    async fn fetch_historical(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        interval: HistoryInterval,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let symbol = symbol.to_uppercase();
        // Compact output covers the last 100 bars; anything older needs the full series.
        let output_size = if Utc::now() - start > chrono::Duration::days(100) {
            "full"
        } else {
            "compact"
        };

        let body = if interval.is_intraday() {
            self.get_json(&[
                ("function", "TIME_SERIES_INTRADAY"),
                ("symbol", &symbol),
                ("interval", intraday_param(interval)),
                ("outputsize", output_size),
            ])
            .await?
        } else {
            self.get_json(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", &symbol),
                ("outputsize", output_size),
            ])
            .await?
        };

        Self::parse_time_series(&symbol, &body, start)
    }
}
