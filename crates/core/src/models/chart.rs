use serde::{Deserialize, Serialize};

/// A single point of a watchlist's aligned return curve.
///
/// The core computes these, the frontend only renders them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedPoint {
    /// Milliseconds since the Unix epoch
    pub timestamp_value: i64,

    /// Average return across contributing tickers, in percent
    pub return_percent: f64,

    /// Position of the point on the chart's x axis (0-based)
    pub x_index: usize,
}

/// Ordered (ascending time) return curve. Derived data, never persisted.
pub type AlignedSeries = Vec<AlignedPoint>;

/// Which point cap applies when downsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChartView {
    /// Full-size chart
    #[default]
    Full,
    /// Miniature sparkline
    Mini,
}

impl ChartView {
    #[must_use]
    pub fn from_mini(mini: bool) -> Self {
        if mini {
            ChartView::Mini
        } else {
            ChartView::Full
        }
    }
}

/// Y-axis bounds for rendering a series.
///
/// A flat series gets a ±1 percentage point band so the line does not
/// collapse into a zero-height plot. `None` for an empty series.
#[must_use]
pub fn return_range(series: &[AlignedPoint]) -> Option<(f64, f64)> {
    let mut values = series.iter().map(|p| p.return_percent);
    let first = values.next()?;
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if max - min < f64::EPSILON {
        Some((min - 1.0, max + 1.0))
    } else {
        Some((min, max))
    }
}
