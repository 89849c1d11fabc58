use analysis_core::{stats, AnalysisError, AssetSeries, PriceField, Ratio};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::adapter::PriceMatrix;

/// Trailing window for the volume and range averages.
pub const SNAPSHOT_WINDOW: usize = 20;

/// Latest-bar view of one asset. Changes are fractions, not percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub previous_price: f64,
    pub price_change: Ratio,
    pub volume: f64,
    pub average_volume: f64,
    pub volume_change: Ratio,
    pub period_high: f64,
    pub distance_to_high: Ratio,
    /// Last bar's (high - low) / low.
    pub range: Ratio,
    pub average_range: Ratio,
}

impl MarketSnapshot {
    pub fn from_series(series: &AssetSeries) -> Result<Self, AnalysisError> {
        let n = series.len();
        if n < 2 {
            return Err(AnalysisError::insufficient(2, n));
        }
        let prices = series.prices();
        let high = series.column(PriceField::High)?;
        let low = series.column(PriceField::Low)?;
        let volume = series.column(PriceField::Volume)?;

        let current_price = prices[n - 1];
        let previous_price = prices[n - 2];
        let tail = n.saturating_sub(SNAPSHOT_WINDOW);

        let average_volume = stats::mean(&volume[tail..]);
        let period_high = high.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let ranges: Vec<f64> = high.iter().zip(low).map(|(h, l)| h - l).collect();
        let range = Ratio::from_parts(ranges[n - 1], low[n - 1]);
        let average_range = Ratio::from_parts(stats::mean(&ranges[tail..]), stats::mean(&low[tail..]));

        Ok(Self {
            symbol: series.symbol.clone(),
            current_price,
            previous_price,
            price_change: Ratio::from_parts(current_price - previous_price, previous_price),
            volume: volume[n - 1],
            average_volume,
            volume_change: Ratio::from_parts(volume[n - 1] - average_volume, average_volume),
            period_high,
            distance_to_high: Ratio::from_parts(current_price - period_high, period_high),
            range,
            average_range,
        })
    }
}

/// Simple moving average; `None` until `window` observations are available.
pub fn moving_average(values: &[f64], window: usize) -> Result<Vec<Option<f64>>, AnalysisError> {
    if window == 0 {
        return Err(AnalysisError::InvalidInput("moving average window must be positive".to_string()));
    }
    let mut out = vec![None; values.len()];
    for end in window..=values.len() {
        out[end - 1] = Some(stats::mean(&values[end - window..end]));
    }
    Ok(out)
}

/// `P[t] / P[0] - 1` for every asset in the matrix.
pub fn relative_performance(matrix: &PriceMatrix) -> Vec<Vec<f64>> {
    matrix
        .prices
        .iter()
        .map(|p| match p.first() {
            Some(&base) if base != 0.0 => p.iter().map(|x| x / base - 1.0).collect(),
            _ => vec![0.0; p.len()],
        })
        .collect()
}

/// Pearson correlation of prices. A constant series correlates 0 with
/// everything, itself included.
pub fn correlation_matrix(matrix: &PriceMatrix) -> DMatrix<f64> {
    let n = matrix.asset_count();
    DMatrix::from_fn(n, n, |i, j| stats::correlation(&matrix.prices[i], &matrix.prices[j]))
}
