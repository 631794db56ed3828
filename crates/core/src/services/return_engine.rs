use std::sync::Arc;

use crate::models::chart::{AlignedSeries, ChartView};
use crate::models::settings::AlignerConfig;
use crate::models::ticker::TickerItem;
use crate::models::timeframe::Timeframe;
use crate::services::aligner::{AlignEntry, TimeSeriesAligner};
use crate::services::timing::{Clock, SystemClock};

/// Watchlist-level return figures for the header and the chart.
///
/// Holds no state of its own: every call recomputes from the items, so there
/// is no cache to invalidate when the scheduler merges new quotes.
pub struct PortfolioReturnEngine {
    aligner: TimeSeriesAligner,
    clock: Arc<dyn Clock>,
}

impl PortfolioReturnEngine {
    pub fn new(config: AlignerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AlignerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            aligner: TimeSeriesAligner::new(config),
            clock,
        }
    }

    #[must_use]
    pub fn aligner(&self) -> &TimeSeriesAligner {
        &self.aligner
    }

    /// Return shown in the watchlist header: the last point of the full
    /// chart series, or 0 when nothing can be computed.
    #[must_use]
    pub fn snapshot_return(&self, items: &[TickerItem], timeframe: Timeframe) -> f64 {
        self.chart_series(items, timeframe, false)
            .last()
            .map_or(0.0, |p| p.return_percent)
    }

    /// Full or miniature return curve for the chart.
    #[must_use]
    pub fn chart_series(&self, items: &[TickerItem], timeframe: Timeframe, mini: bool) -> AlignedSeries {
        let entries: Vec<AlignEntry<'_>> = items.iter().map(AlignEntry::from).collect();
        self.aligner
            .align(&entries, timeframe, ChartView::from_mini(mini), self.clock.now())
    }
}

impl Default for PortfolioReturnEngine {
    fn default() -> Self {
        Self::new(AlignerConfig::default())
    }
}
