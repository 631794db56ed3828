use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::models::chart::{AlignedPoint, AlignedSeries, ChartView};
use crate::models::price::PricePoint;
use crate::models::settings::AlignerConfig;
use crate::models::ticker::TickerItem;
use crate::models::timeframe::Timeframe;

/// One symbol's input to the aligner.
#[derive(Debug, Clone, Copy)]
pub struct AlignEntry<'a> {
    pub symbol: &'a str,
    pub buy_date: DateTime<Utc>,
    pub buy_price: f64,
    /// Any order; sorted internally
    pub historical_data: &'a [PricePoint],
}

impl<'a> From<&'a TickerItem> for AlignEntry<'a> {
    fn from(item: &'a TickerItem) -> Self {
        Self {
            symbol: &item.symbol,
            buy_date: item.buy_date,
            buy_price: item.buy_price,
            historical_data: &item.historical_data,
        }
    }
}

/// An entry after slicing: sorted `(timestamp_ms, price)` pairs inside the window.
#[derive(Debug)]
struct SlicedEntry {
    buy_price: f64,
    points: Vec<(i64, f64)>,
}

/// Turns per-symbol price histories into one averaged return curve.
///
/// Pure computation: the only input besides the entries is `now`, which
/// anchors the timeframe window.
///
/// 1. Sort each series and slice it to the timeframe window
///    (per-timeframe anchor: lookback, buy date, or the later of the two).
/// 2. Pad every sliced series to the common span with its nearest price,
///    so a short history does not make the merged axis jagged.
/// 3. Merge all timestamps into one ascending axis and downsample it.
/// 4. At each sampled timestamp, average `(nearest - buy) / buy * 100`
///    over the entries that yield a finite value.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesAligner {
    config: AlignerConfig,
}

impl TimeSeriesAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Maximum number of points for a view.
    #[must_use]
    pub fn cap_for(&self, view: ChartView) -> usize {
        match view {
            ChartView::Full => self.config.full_cap,
            ChartView::Mini => self.config.mini_cap,
        }
    }

    /// Build the aligned return series. Zero usable entries yield an empty series.
    pub fn align(
        &self,
        entries: &[AlignEntry<'_>],
        timeframe: Timeframe,
        view: ChartView,
        now: DateTime<Utc>,
    ) -> AlignedSeries {
        let mut sliced: Vec<SlicedEntry> = entries
            .iter()
            .filter_map(|entry| self.slice_entry(entry, timeframe, now))
            .collect();

        let (Some(span_start), Some(span_end)) = (
            sliced.iter().filter_map(|s| s.points.first()).map(|p| p.0).min(),
            sliced.iter().filter_map(|s| s.points.last()).map(|p| p.0).max(),
        ) else {
            return Vec::new();
        };

        for entry in &mut sliced {
            pad_to_span(&mut entry.points, span_start, span_end);
        }

        let mut axis: Vec<i64> = sliced
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.0))
            .collect();
        axis.sort_unstable();
        axis.dedup();

        let min_gap_ms = self.config.min_gap_secs.get(timeframe).saturating_mul(1000);
        let sampled = self.downsample(&axis, self.cap_for(view), min_gap_ms);

        let mut series = Vec::with_capacity(sampled.len());
        for timestamp in sampled {
            let mut sum = 0.0;
            let mut count = 0usize;
            for entry in &sliced {
                let Some(price) = nearest_price(&entry.points, timestamp) else {
                    continue;
                };
                let ret = (price - entry.buy_price) / entry.buy_price * 100.0;
                if ret.is_finite() {
                    sum += ret;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }
            let return_percent = sum / count as f64;
            if !return_percent.is_finite() {
                continue;
            }
            series.push(AlignedPoint {
                timestamp_value: timestamp,
                return_percent,
                x_index: series.len(),
            });
        }

        series
    }

    /// Reduce a sorted, de-duplicated axis to at most `cap` timestamps.
    ///
    /// An axis already within the cap is returned whole. Otherwise even-stride
    /// selection keeps the first and last timestamp, and the minimum-gap
    /// filter thins points closer than `min_gap_ms`. The filter is skipped
    /// for sparse strided sets and undone when it would leave fewer than
    /// `min_points`.
    #[must_use]
    pub fn downsample(&self, axis: &[i64], cap: usize, min_gap_ms: i64) -> Vec<i64> {
        let n = axis.len();
        let cap = cap.max(2);
        if n <= cap {
            return axis.to_vec();
        }

        // n > cap ≥ 2, so the stride is > 1 and indices are strictly increasing.
        let strided: Vec<i64> = (0..cap).map(|i| axis[i * (n - 1) / (cap - 1)]).collect();

        if strided.len() <= self.config.sparse_threshold {
            return strided;
        }

        let filtered = min_gap_filter(&strided, min_gap_ms);
        if filtered.len() < self.config.min_points {
            return strided;
        }
        filtered
    }

    fn slice_entry(
        &self,
        entry: &AlignEntry<'_>,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Option<SlicedEntry> {
        if !(entry.buy_price.is_finite() && entry.buy_price > 0.0) {
            warn!(
                "Excluding {} from returns: invalid buy price {}",
                entry.symbol, entry.buy_price
            );
            return None;
        }

        let start = self
            .config
            .anchors
            .get(timeframe)
            .resolve(timeframe, now, entry.buy_date)
            .map(|s| s.timestamp_millis());
        let end = now.timestamp_millis();

        let mut dropped = 0usize;
        let mut points: Vec<(i64, f64)> = entry
            .historical_data
            .iter()
            .filter(|p| {
                let usable = p.is_usable();
                if !usable {
                    dropped += 1;
                }
                usable
            })
            .map(|p| (p.timestamp_millis(), p.price))
            .filter(|(t, _)| start.map_or(true, |s| *t >= s) && *t <= end)
            .collect();

        if dropped > 0 {
            warn!("Dropped {dropped} non-positive or non-finite prices for {}", entry.symbol);
        }

        points.sort_by_key(|p| p.0);
        points.dedup_by_key(|p| p.0);

        if points.is_empty() {
            debug!("{} has no prices inside the {timeframe} window", entry.symbol);
            return None;
        }

        Some(SlicedEntry {
            buy_price: entry.buy_price,
            points,
        })
    }
}

/// Synthesize boundary copies so the series spans exactly `[start, end]`.
fn pad_to_span(points: &mut Vec<(i64, f64)>, start: i64, end: i64) {
    if let Some(&(first_t, first_price)) = points.first() {
        if first_t > start {
            points.insert(0, (start, first_price));
        }
    }
    if let Some(&(last_t, last_price)) = points.last() {
        if last_t < end {
            points.push((end, last_price));
        }
    }
}

/// Price of the point closest in time to `t` (ties go to the earlier point).
fn nearest_price(points: &[(i64, f64)], t: i64) -> Option<f64> {
    let idx = points.partition_point(|p| p.0 < t);
    let after = points.get(idx);
    let before = idx.checked_sub(1).and_then(|i| points.get(i));
    match (before, after) {
        (Some(b), Some(a)) => {
            if (t - b.0) <= (a.0 - t) {
                Some(b.1)
            } else {
                Some(a.1)
            }
        }
        (Some(b), None) => Some(b.1),
        (None, Some(a)) => Some(a.1),
        (None, None) => None,
    }
}

/// Keep points at least `min_gap_ms` apart, always ending on the final timestamp.
fn min_gap_filter(points: &[i64], min_gap_ms: i64) -> Vec<i64> {
    let Some((&first, rest)) = points.split_first() else {
        return Vec::new();
    };
    let mut kept = vec![first];
    for &t in rest {
        if kept.last().map_or(true, |&prev| t - prev >= min_gap_ms) {
            kept.push(t);
        }
    }

    if let (Some(&final_t), Some(&last_kept)) = (points.last(), kept.last()) {
        if last_kept != final_t {
            // Replace a too-close tail point rather than crowd the end of the curve.
            if kept.len() > 1 && final_t - last_kept < min_gap_ms {
                kept.pop();
            }
            kept.push(final_t);
        }
    }
    kept
}
