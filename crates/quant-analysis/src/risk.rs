use analysis_core::{stats, AnalysisConfig, AnalysisError, Ratio};
use serde::{Deserialize, Serialize};

use crate::statistics::{annualize_return, descriptive_stats};

/// Risk/return profile of one return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetricsReport {
    pub observations: usize,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: Ratio,
    pub sortino_ratio: Ratio,
    pub max_drawdown: f64,
    /// Drawdown at every point of the growth curve, aligned with the returns.
    pub drawdown: Vec<f64>,
    pub beta: Option<Ratio>,
    pub alpha: Option<f64>,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub value_at_risk: f64,
    pub var_confidence: f64,
    pub risk_free_rate: f64,
}

/// CAPM regression against a benchmark over the right-aligned overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapmEstimate {
    pub beta: Ratio,
    pub alpha: f64,
    pub observations: usize,
}

/// Full risk report. `benchmark` enables beta and alpha.
pub fn evaluate(
    returns: &[f64],
    benchmark: Option<&[f64]>,
    config: &AnalysisConfig,
) -> Result<RiskMetricsReport, AnalysisError> {
    let data = stats::finite(returns);
    let desc = descriptive_stats(&data, config)?;
    let (drawdown, max_drawdown) = drawdown_series(&data);

    let estimate = match benchmark {
        Some(bench) => Some(capm(&data, &stats::finite(bench), config)?),
        None => None,
    };

    tracing::debug!(
        "risk report over {} returns, benchmark: {}",
        desc.observations,
        estimate.is_some()
    );

    Ok(RiskMetricsReport {
        observations: desc.observations,
        annualized_return: desc.annualized_return,
        annualized_volatility: desc.annualized_volatility,
        sharpe_ratio: sharpe_ratio(&data, config.risk_free_rate, config.periods_per_year),
        sortino_ratio: sortino_ratio(&data, config.risk_free_rate, config.periods_per_year),
        max_drawdown,
        drawdown,
        beta: estimate.map(|c| c.beta),
        alpha: estimate.map(|c| c.alpha),
        skewness: desc.skewness,
        excess_kurtosis: desc.excess_kurtosis,
        value_at_risk: desc.value_at_risk,
        var_confidence: desc.var_confidence,
        risk_free_rate: config.risk_free_rate,
    })
}

/// `mean(r - rf/ppy) / std(r) * sqrt(ppy)`; degenerate when std is zero.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> Ratio {
    if returns.len() < 2 {
        return Ratio::Degenerate;
    }
    let daily_rf = risk_free_rate / periods_per_year;
    let excess_mean = stats::mean(returns) - daily_rf;
    Ratio::from_parts(excess_mean, stats::std_dev(returns)).map(|r| r * periods_per_year.sqrt())
}

/// Annualized excess return over annualized downside deviation.
///
/// Downside deviation is the sample std of the strictly negative returns, so
/// fewer than two losses (or identical losses) give a degenerate ratio.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> Ratio {
    if returns.is_empty() {
        return Ratio::Degenerate;
    }
    let losses: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
    if losses.len() < 2 {
        return Ratio::Degenerate;
    }
    let downside = stats::std_dev(&losses) * periods_per_year.sqrt();
    let excess = annualize_return(stats::mean(returns), periods_per_year) - risk_free_rate;
    Ratio::from_parts(excess, downside)
}

/// Drawdown of the growth curve `cumprod(1 + r)` against its running peak.
/// Returns the series (one point per return, the first being its own peak)
/// and its minimum.
pub fn drawdown_series(returns: &[f64]) -> (Vec<f64>, f64) {
    let mut series = Vec::with_capacity(returns.len());
    let mut value = 1.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;

    for &r in returns {
        value *= 1.0 + r;
        if value > peak {
            peak = value;
        }
        let dd = if peak > 0.0 { (value - peak) / peak } else { 0.0 };
        max_dd = max_dd.min(dd);
        series.push(dd);
    }

    (series, max_dd)
}

/// Trailing `min(len)` observations of both series.
pub fn right_align<'a>(a: &'a [f64], b: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    let n = a.len().min(b.len());
    (&a[a.len() - n..], &b[b.len() - n..])
}

/// Sample covariance over sample benchmark variance, on the aligned window.
pub fn beta(asset: &[f64], benchmark: &[f64]) -> Ratio {
    let (asset, benchmark) = right_align(asset, benchmark);
    if asset.len() < 2 {
        return Ratio::Degenerate;
    }
    Ratio::from_parts(
        stats::covariance(asset, benchmark),
        stats::variance(benchmark),
    )
}

/// Beta and Jensen's alpha against `benchmark`.
pub fn capm(
    asset: &[f64],
    benchmark: &[f64],
    config: &AnalysisConfig,
) -> Result<CapmEstimate, AnalysisError> {
    let (asset, benchmark) = right_align(asset, benchmark);
    if asset.len() < 2 {
        return Err(AnalysisError::insufficient(2, asset.len()));
    }
    let ppy = config.periods_per_year;
    let rf = config.risk_free_rate;

    let beta = beta(asset, benchmark);
    let asset_annual = annualize_return(stats::mean(asset), ppy);
    let bench_annual = annualize_return(stats::mean(benchmark), ppy);
    let alpha = asset_annual - (rf + beta.value() * (bench_annual - rf));

    Ok(CapmEstimate {
        beta,
        alpha,
        observations: asset.len(),
    })
}
