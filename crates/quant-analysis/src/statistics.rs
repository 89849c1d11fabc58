use analysis_core::{stats, AnalysisConfig, AnalysisError};
use serde::{Deserialize, Serialize};

/// Descriptive statistics of one return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub observations: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64, // sample, N-1
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    /// Empirical per-period VaR: the return at the (1 - confidence) percentile.
    /// Negative for a loss.
    pub value_at_risk: f64,
    pub var_confidence: f64,
}

/// Mean, dispersion, shape and empirical VaR after discarding non-finite values.
pub fn descriptive_stats(
    returns: &[f64],
    config: &AnalysisConfig,
) -> Result<DescriptiveStats, AnalysisError> {
    let data = stats::finite(returns);
    if data.len() < 2 {
        return Err(AnalysisError::insufficient(2, data.len()));
    }

    let mean = stats::mean(&data);
    let std_dev = stats::std_dev(&data);

    Ok(DescriptiveStats {
        observations: data.len(),
        mean,
        median: stats::median(&data),
        std_dev,
        annualized_return: annualize_return(mean, config.periods_per_year),
        annualized_volatility: annualize_volatility(std_dev, config.periods_per_year),
        skewness: stats::skewness(&data),
        excess_kurtosis: stats::excess_kurtosis(&data),
        value_at_risk: stats::percentile(&data, config.var_percentile()),
        var_confidence: config.var_confidence,
    })
}

pub fn annualize_return(mean: f64, periods_per_year: f64) -> f64 {
    mean * periods_per_year
}

pub fn annualize_volatility(std_dev: f64, periods_per_year: f64) -> f64 {
    std_dev * periods_per_year.sqrt()
}

/// Coarse bucket for annualized volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,      // below 15%
    Moderate,
    High,     // above 30%
}

impl VolatilityRegime {
    pub fn classify(annualized_volatility: f64) -> Self {
        if annualized_volatility > 0.30 {
            VolatilityRegime::High
        } else if annualized_volatility < 0.15 {
            VolatilityRegime::Low
        } else {
            VolatilityRegime::Moderate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::{log_returns, LOG_EPSILON};
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_growth_annualized_return() {
        let r = log_returns(&[100.0, 105.0, 110.25], LOG_EPSILON);
        let s = descriptive_stats(r.values(), &AnalysisConfig::default()).unwrap();
        assert_eq!(s.observations, 2);
        assert_relative_eq!(s.annualized_return, 0.04879 * 252.0, epsilon = 1e-2);
        assert_relative_eq!(s.annualized_return, 12.295, epsilon = 1e-3);
        assert!(s.std_dev < 1e-9);
    }

    #[test]
    fn test_non_finite_discarded_before_counting() {
        let data = vec![0.01, f64::NAN, -0.02, f64::INFINITY, 0.03];
        let s = descriptive_stats(&data, &AnalysisConfig::default()).unwrap();
        assert_eq!(s.observations, 3);
        assert_relative_eq!(s.mean, 0.02 / 3.0, epsilon = 1e-15);
    }

    #[test]
    fn test_insufficient_data_is_explicit() {
        let err = descriptive_stats(&[0.01, f64::NAN], &AnalysisConfig::default()).unwrap_err();
        assert_eq!(err, AnalysisError::InsufficientData { required: 2, available: 1 });
    }

    #[test]
    fn test_var_is_fifth_percentile() {
        let data: Vec<f64> = (0..=100).map(|i| (i as f64 - 50.0) / 1000.0).collect();
        let s = descriptive_stats(&data, &AnalysisConfig::default()).unwrap();
        // 101 evenly spaced points: the 5th percentile is the 6th smallest
        assert_relative_eq!(s.value_at_risk, -0.045, epsilon = 1e-12);
        assert_relative_eq!(s.median, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_periods_per_year_is_configurable() {
        let data = vec![0.01, 0.02, 0.03];
        let weekly = AnalysisConfig {
            periods_per_year: 52.0,
            ..AnalysisConfig::default()
        };
        let s = descriptive_stats(&data, &weekly).unwrap();
        assert_relative_eq!(s.annualized_return, 0.02 * 52.0, epsilon = 1e-12);
        assert_relative_eq!(s.annualized_volatility, 0.01 * 52.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_volatility_regime_buckets() {
        assert_eq!(VolatilityRegime::classify(0.10), VolatilityRegime::Low);
        assert_eq!(VolatilityRegime::classify(0.22), VolatilityRegime::Moderate);
        assert_eq!(VolatilityRegime::classify(0.45), VolatilityRegime::High);
    }
}
