use analysis_core::{stats, AnalysisError};
use nalgebra::DMatrix;
use rand::distributions::Open01;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::returns::{simple_returns, to_log};

/// Simulated price paths, `horizon` rows by `scenarios` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub last_price: f64,
    pub drift: f64,
    pub volatility: f64,
    /// `grid[(day, scenario)]`; row 0 is the last observed price.
    pub grid: DMatrix<f64>,
}

impl SimulationResult {
    pub fn horizon(&self) -> usize {
        self.grid.nrows()
    }

    pub fn scenarios(&self) -> usize {
        self.grid.ncols()
    }

    pub fn price(&self, day: usize, scenario: usize) -> f64 {
        self.grid[(day, scenario)]
    }

    /// Last row of the grid.
    pub fn terminal_prices(&self) -> Vec<f64> {
        let last = self.grid.nrows() - 1;
        self.grid.row(last).iter().copied().collect()
    }

    /// Percentile (0-100) across scenarios for every day.
    pub fn percentile_band(&self, pct: f64) -> Vec<f64> {
        self.grid
            .row_iter()
            .map(|row| {
                let values: Vec<f64> = row.iter().copied().collect();
                stats::percentile(&values, pct)
            })
            .collect()
    }

    pub fn summary(&self) -> SimulationSummary {
        SimulationSummary::from_terminal(self.last_price, &self.terminal_prices())
    }
}

/// Scenario-VaR bucket for a simulated horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Moderate,
    High,
    Extreme,
}

impl RiskLevel {
    pub fn from_var(value_at_risk: f64) -> Self {
        let loss = value_at_risk.abs();
        if loss > 0.20 {
            RiskLevel::Extreme
        } else if loss > 0.10 {
            RiskLevel::High
        } else {
            RiskLevel::Moderate
        }
    }
}

/// Distribution of terminal prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub current_price: f64,
    pub mean_terminal: f64,
    pub median_terminal: f64,
    pub bear_case: f64, // 5th percentile
    pub bull_case: f64, // 95th percentile
    pub probability_of_profit: f64,
    pub expected_move: f64,
    /// 5th percentile of terminal simple returns.
    pub value_at_risk: f64,
    pub risk_level: RiskLevel,
}

impl SimulationSummary {
    pub fn from_terminal(current_price: f64, terminal: &[f64]) -> Self {
        let n = terminal.len().max(1) as f64;
        let mean_terminal = stats::mean(terminal);
        let profitable = terminal.iter().filter(|&&p| p > current_price).count();
        let terminal_returns: Vec<f64> = terminal.iter().map(|p| p / current_price - 1.0).collect();
        let value_at_risk = stats::percentile(&terminal_returns, 5.0);

        Self {
            current_price,
            mean_terminal,
            median_terminal: stats::median(terminal),
            bear_case: stats::percentile(terminal, 5.0),
            bull_case: stats::percentile(terminal, 95.0),
            probability_of_profit: profitable as f64 / n,
            expected_move: mean_terminal / current_price - 1.0,
            value_at_risk,
            risk_level: RiskLevel::from_var(value_at_risk),
        }
    }
}

/// Geometric Brownian motion paths from the historical drift and volatility
/// of `prices`.
///
/// Every uniform draw is taken from `rng` up front, day by day, so the grid
/// depends only on the rng state and not on how paths are spread across
/// threads. Row 0 consumes its draws without using them.
pub fn simulate<R: Rng + ?Sized>(
    prices: &[f64],
    horizon: usize,
    scenarios: usize,
    rng: &mut R,
) -> Result<SimulationResult, AnalysisError> {
    if horizon == 0 || scenarios == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "simulation needs a positive horizon and scenario count, got {}x{}",
            horizon, scenarios
        )));
    }

    let log = to_log(&simple_returns(prices));
    if log.len() < 2 {
        return Err(AnalysisError::insufficient(2, log.len()));
    }
    let last_price = prices
        .iter()
        .rev()
        .copied()
        .find(|p| p.is_finite())
        .ok_or_else(|| AnalysisError::insufficient(2, 0))?;

    let variance = stats::variance(log.values());
    let drift = stats::mean(log.values()) - 0.5 * variance;
    let volatility = variance.sqrt();

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AnalysisError::InvalidInput(format!("standard normal: {}", e)))?;
    let daily: Vec<f64> = (0..horizon * scenarios)
        .map(|_| {
            let u: f64 = rng.sample(Open01);
            (drift + volatility * normal.inverse_cdf(u)).exp()
        })
        .collect();

    let paths: Vec<Vec<f64>> = (0..scenarios)
        .into_par_iter()
        .map(|s| {
            let mut path = Vec::with_capacity(horizon);
            let mut price = last_price;
            path.push(price);
            for t in 1..horizon {
                price *= daily[t * scenarios + s];
                path.push(price);
            }
            path
        })
        .collect();

    tracing::debug!(
        "simulated {} scenarios over {} days (drift {:.6}, vol {:.6})",
        scenarios,
        horizon,
        drift,
        volatility
    );

    Ok(SimulationResult {
        last_price,
        drift,
        volatility,
        grid: DMatrix::from_vec(horizon, scenarios, paths.concat()),
    })
}
