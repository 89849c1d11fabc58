//! Random-weight search over long-only portfolios.
//!
//! Weight vectors are drawn uniformly per asset and normalized to sum to one.
//! When a per-asset cap is configured, each draw is projected onto the capped
//! simplex by clipping and redistributing the excess to the uncapped assets.

use analysis_core::{stats, AnalysisConfig, AnalysisError, Ratio};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::adapter::PriceMatrix;

/// One sampled allocation and its annualized profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioCandidate {
    pub weights: Vec<f64>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: Ratio,
}

/// Stand-alone profile of one asset in the optimization universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetrics {
    pub symbol: String,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: Ratio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub symbols: Vec<String>,
    pub observations: usize,
    pub mean_returns: Vec<f64>,
    pub covariance: DMatrix<f64>,
    pub assets: Vec<AssetMetrics>,
    pub candidates: Vec<PortfolioCandidate>,
    pub max_sharpe: PortfolioCandidate,
    pub min_volatility: PortfolioCandidate,
}

/// Annualized log-return moments of every asset in `matrix`.
struct Moments {
    observations: usize,
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
}

fn moments(matrix: &PriceMatrix, periods_per_year: f64) -> Result<Moments, AnalysisError> {
    let n = matrix.asset_count();
    let rows = matrix.prices.iter().map(Vec::len).min().unwrap_or(0);

    // Per-asset log returns over the rows where every asset's return is finite
    let mut returns: Vec<Vec<f64>> = vec![Vec::with_capacity(rows); n];
    for t in 1..rows {
        let row: Vec<f64> = matrix
            .prices
            .iter()
            .map(|p| (p[t] / p[t - 1]).ln())
            .collect();
        if row.iter().all(|r| r.is_finite()) {
            for (series, r) in returns.iter_mut().zip(row) {
                series.push(r);
            }
        }
    }
    let observations = returns.first().map_or(0, Vec::len);
    if observations < 2 {
        return Err(AnalysisError::insufficient(2, observations));
    }

    let mean = DVector::from_iterator(n, returns.iter().map(|r| stats::mean(r) * periods_per_year));
    let covariance = DMatrix::from_fn(n, n, |i, j| {
        stats::covariance(&returns[i], &returns[j]) * periods_per_year
    });

    Ok(Moments {
        observations,
        mean,
        covariance,
    })
}

fn evaluate(weights: Vec<f64>, moments: &Moments, risk_free_rate: f64) -> PortfolioCandidate {
    let w = DVector::from_column_slice(&weights);
    let expected_return = w.dot(&moments.mean);
    let volatility = w.dot(&(&moments.covariance * &w)).max(0.0).sqrt();
    PortfolioCandidate {
        weights,
        expected_return,
        volatility,
        sharpe_ratio: Ratio::from_parts(expected_return - risk_free_rate, volatility),
    }
}

/// Uniform draw per asset, normalized to sum to one.
fn draw_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    loop {
        let raw: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            return raw.into_iter().map(|w| w / total).collect();
        }
    }
}

/// Clip weights at `cap` and hand the excess to the uncapped assets in
/// proportion to their weight. Requires `cap * n >= 1`.
pub fn cap_weights(mut weights: Vec<f64>, cap: f64) -> Vec<f64> {
    let n = weights.len();
    let mut capped = vec![false; n];
    for _ in 0..n {
        let mut excess = 0.0;
        for (w, c) in weights.iter_mut().zip(capped.iter_mut()) {
            if *w > cap {
                excess += *w - cap;
                *w = cap;
                *c = true;
            }
        }
        if excess <= 0.0 {
            break;
        }

        let free: Vec<usize> = (0..n).filter(|&i| !capped[i]).collect();
        if free.is_empty() {
            break;
        }
        let free_total: f64 = free.iter().map(|&i| weights[i]).sum();
        for &i in &free {
            weights[i] += if free_total > 0.0 {
                excess * weights[i] / free_total
            } else {
                excess / free.len() as f64
            };
        }
    }
    weights
}

/// Sample `config.portfolio_samples` allocations over the assets of `matrix`
/// and pick the max-Sharpe and min-volatility ones.
///
/// Draws come from `rng` serially; candidates are evaluated in parallel.
pub fn optimize<R: Rng + ?Sized>(
    matrix: &PriceMatrix,
    config: &AnalysisConfig,
    rng: &mut R,
) -> Result<OptimizationResult, AnalysisError> {
    let n = matrix.asset_count();
    if n < 2 {
        return Err(AnalysisError::InsufficientAssets {
            required: 2,
            available: n,
        });
    }
    if config.portfolio_samples == 0 {
        return Err(AnalysisError::InvalidInput(
            "portfolio_samples must be non-zero".to_string(),
        ));
    }
    if let Some(cap) = config.max_weight {
        if cap * (n as f64) < 1.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "max_weight {} cannot be met by {} assets",
                cap, n
            )));
        }
    }

    let moments = moments(matrix, config.periods_per_year)?;
    let rf = config.risk_free_rate;

    let draws: Vec<Vec<f64>> = (0..config.portfolio_samples)
        .map(|_| {
            let w = draw_weights(n, rng);
            match config.max_weight {
                Some(cap) => cap_weights(w, cap),
                None => w,
            }
        })
        .collect();

    let candidates: Vec<PortfolioCandidate> = draws
        .into_par_iter()
        .map(|w| evaluate(w, &moments, rf))
        .collect();

    let (best_sharpe, best_vol) = select(&candidates);

    let assets = matrix
        .symbols
        .iter()
        .enumerate()
        .map(|(i, symbol)| {
            let annualized_volatility = moments.covariance[(i, i)].max(0.0).sqrt();
            AssetMetrics {
                symbol: symbol.clone(),
                annualized_return: moments.mean[i],
                annualized_volatility,
                sharpe_ratio: Ratio::from_parts(moments.mean[i] - rf, annualized_volatility),
            }
        })
        .collect();

    tracing::info!(
        "optimized {} assets over {} samples: max Sharpe {:.3}, min vol {:.4}",
        n,
        candidates.len(),
        candidates[best_sharpe].sharpe_ratio.value(),
        candidates[best_vol].volatility
    );

    Ok(OptimizationResult {
        symbols: matrix.symbols.clone(),
        observations: moments.observations,
        mean_returns: moments.mean.iter().copied().collect(),
        covariance: moments.covariance,
        assets,
        max_sharpe: candidates[best_sharpe].clone(),
        min_volatility: candidates[best_vol].clone(),
        candidates,
    })
}

/// Indices of the max-Sharpe and min-volatility candidates; ties keep the
/// first. Degenerate Sharpe ratios rank below every defined one.
fn select(candidates: &[PortfolioCandidate]) -> (usize, usize) {
    let mut best_sharpe = 0;
    let mut best_vol = 0;
    for (i, c) in candidates.iter().enumerate() {
        // None < Some(_) for Option ordering
        if c.sharpe_ratio.defined() > candidates[best_sharpe].sharpe_ratio.defined() {
            best_sharpe = i;
        }
        if c.volatility < candidates[best_vol].volatility {
            best_vol = i;
        }
    }
    (best_sharpe, best_vol)
}
