use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Interval};

/// Tunables shared by every analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    // Annualisation
    pub periods_per_year: f64,   // 252 for daily bars
    pub risk_free_rate: f64,     // annual, 0.03 = 3%
    pub var_confidence: f64,     // 0.95 -> 5th percentile
    pub log_epsilon: f64,        // guards ln(P[t] / P[t-1])

    // Minimum clean rows for the multi-metric asset view
    pub min_observations: usize,

    // Monte Carlo
    pub forecast_horizon: usize, // days
    pub scenarios: usize,

    // Portfolio search
    pub portfolio_samples: usize,
    pub max_weight: Option<f64>, // per-asset cap, None = uniform simplex

    // Random source; None draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            periods_per_year: Interval::Day.periods_per_year(),
            risk_free_rate: 0.03,
            var_confidence: 0.95,
            log_epsilon: 1e-9,
            min_observations: 30,
            forecast_horizon: 30,
            scenarios: 500,
            portfolio_samples: 5000,
            max_weight: None,
            seed: None,
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by `QUANT_*` environment variables.
    pub fn from_env() -> Result<Self, AnalysisError> {
        let defaults = Self::default();
        let periods_per_year = match env::var("QUANT_INTERVAL") {
            Ok(raw) => raw.parse::<Interval>()?.periods_per_year(),
            Err(_) => defaults.periods_per_year,
        };
        let config = Self {
            periods_per_year: env_or("QUANT_PERIODS_PER_YEAR", periods_per_year)?,
            risk_free_rate: env_or("QUANT_RISK_FREE_RATE", defaults.risk_free_rate)?,
            var_confidence: env_or("QUANT_VAR_CONFIDENCE", defaults.var_confidence)?,
            log_epsilon: env_or("QUANT_LOG_EPSILON", defaults.log_epsilon)?,
            min_observations: env_or("QUANT_MIN_OBSERVATIONS", defaults.min_observations)?,
            forecast_horizon: env_or("QUANT_FORECAST_HORIZON", defaults.forecast_horizon)?,
            scenarios: env_or("QUANT_SCENARIOS", defaults.scenarios)?,
            portfolio_samples: env_or("QUANT_PORTFOLIO_SAMPLES", defaults.portfolio_samples)?,
            max_weight: env_opt("QUANT_MAX_WEIGHT")?,
            seed: env_opt("QUANT_SEED")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Same configuration annualised for another sampling interval.
    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.periods_per_year = interval.periods_per_year();
        self
    }

    pub fn daily_risk_free_rate(&self) -> f64 {
        self.risk_free_rate / self.periods_per_year
    }

    /// Percentile (0-100) that marks the VaR threshold, e.g. 5 for 95%.
    pub fn var_percentile(&self) -> f64 {
        (1.0 - self.var_confidence) * 100.0
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.periods_per_year > 0.0) {
            return Err(AnalysisError::InvalidInput(
                "periods_per_year must be positive".to_string(),
            ));
        }
        if !(self.var_confidence > 0.0 && self.var_confidence < 1.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "var_confidence must be in (0, 1), got {}",
                self.var_confidence
            )));
        }
        if self.forecast_horizon == 0 || self.scenarios == 0 || self.portfolio_samples == 0 {
            return Err(AnalysisError::InvalidInput(
                "horizon, scenarios and portfolio samples must be non-zero".to_string(),
            ));
        }
        if let Some(cap) = self.max_weight {
            if !(cap > 0.0 && cap <= 1.0) {
                return Err(AnalysisError::InvalidInput(format!(
                    "max_weight must be in (0, 1], got {}",
                    cap
                )));
            }
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, AnalysisError> {
    Ok(env_opt(key)?.unwrap_or(default))
}

fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>, AnalysisError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AnalysisError::InvalidInput(format!("{}: cannot parse '{}'", key, raw))),
        _ => Ok(None),
    }
}
