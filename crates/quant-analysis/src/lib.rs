pub mod adapter;
pub mod market;
pub mod monte_carlo;
pub mod optimizer;
pub mod returns;
pub mod risk;
pub mod statistics;

#[cfg(test)]
mod tests;

use analysis_core::{
    AnalysisConfig, AnalysisError, PriceField, PriceRequest, PriceSource, PriceTable, ReturnSeries,
};
use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub use adapter::{PriceMatrix, PriceSeriesAdapter};
pub use market::MarketSnapshot;
pub use monte_carlo::{RiskLevel, SimulationResult, SimulationSummary};
pub use optimizer::{AssetMetrics, OptimizationResult, PortfolioCandidate};
pub use risk::RiskMetricsReport;
pub use statistics::{DescriptiveStats, VolatilityRegime};

const SHORT_MA: usize = 20;
const LONG_MA: usize = 50;

/// Everything the single-asset view shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetAnalysis {
    pub symbol: String,
    pub price_field: PriceField,
    pub observations: usize,
    pub last_price: f64,
    /// Shape statistics of log returns.
    pub log_return_stats: DescriptiveStats,
    /// Risk metrics of simple returns.
    pub risk: RiskMetricsReport,
    pub volatility_regime: VolatilityRegime,
    /// Absent when the source has no high/low/volume columns.
    pub snapshot: Option<MarketSnapshot>,
    pub moving_average_short: Option<f64>,
    pub moving_average_long: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub symbol: String,
    pub simulation: SimulationResult,
    pub summary: SimulationSummary,
    pub bear_band: Vec<f64>,
    pub bull_band: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub symbols: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub relative_performance: Vec<Vec<f64>>,
    pub correlation: DMatrix<f64>,
}

/// Outcome for one symbol of a batch; failures are carried, not raised.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub symbol: String,
    pub result: Result<AssetAnalysis, AnalysisError>,
}

pub struct QuantAnalysisEngine {
    config: AnalysisConfig,
}

impl QuantAnalysisEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Seeded from `config.seed` when set, otherwise from OS entropy.
    pub fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Fetch and normalize a table. `Ok(None)` when the source has nothing.
    pub async fn load(
        &self,
        source: &dyn PriceSource,
        request: &PriceRequest,
    ) -> Result<Option<PriceTable>, AnalysisError> {
        let frame = match source.fetch(request).await? {
            Some(frame) if !frame.is_empty() => frame,
            _ => {
                tracing::info!("No data returned for {:?}", request.symbols);
                return Ok(None);
            }
        };
        let default_symbol = request.symbols.first().map(String::as_str).unwrap_or_default();
        let table = PriceTable::from_raw(frame, default_symbol)?;
        tracing::info!(
            "Loaded {} rows for {} symbol(s) ({:?} layout)",
            table.len(),
            table.symbols().len(),
            table.layout()
        );
        Ok(Some(table))
    }

    /// Descriptive statistics, risk metrics and market snapshot of one asset.
    pub fn analyze_asset(
        &self,
        table: &PriceTable,
        symbol: &str,
        benchmark: Option<&str>,
    ) -> Result<AssetAnalysis, AnalysisError> {
        let bench_returns = match benchmark {
            Some(b) => Some(self.simple_returns_of(table, b)?),
            None => None,
        };
        self.analyze_with(table, symbol, bench_returns.as_ref())
    }

    /// Analyze every symbol; one failing asset never aborts the rest.
    ///
    /// A benchmark that cannot be loaded, or is too short for a regression,
    /// is dropped with a warning and the batch runs without beta/alpha.
    pub fn analyze_batch(
        &self,
        table: &PriceTable,
        symbols: &[String],
        benchmark: Option<&str>,
    ) -> Vec<BatchEntry> {
        let bench_returns = benchmark.and_then(|b| match self.simple_returns_of(table, b) {
            Ok(r) if r.len() >= 2 => Some(r),
            Ok(r) => {
                tracing::warn!("Benchmark {} has {} returns, need at least 2", b, r.len());
                None
            }
            Err(e) => {
                tracing::warn!("Benchmark {} unavailable: {}", b, e);
                None
            }
        });

        let entries: Vec<BatchEntry> = symbols
            .iter()
            .map(|symbol| {
                let result = self.analyze_with(table, symbol, bench_returns.as_ref());
                if let Err(e) = &result {
                    tracing::warn!("Skipping {}: {}", symbol, e);
                }
                BatchEntry {
                    symbol: symbol.clone(),
                    result,
                }
            })
            .collect();

        let ok = entries.iter().filter(|e| e.result.is_ok()).count();
        tracing::info!("Batch analysis: {}/{} assets analyzed", ok, entries.len());
        entries
    }

    /// Monte Carlo projection of `symbol` over the configured horizon.
    pub fn forecast<R: Rng + ?Sized>(
        &self,
        table: &PriceTable,
        symbol: &str,
        rng: &mut R,
    ) -> Result<Forecast, AnalysisError> {
        let series = PriceSeriesAdapter::extract(table, symbol)?;
        let simulation = monte_carlo::simulate(
            series.prices(),
            self.config.forecast_horizon,
            self.config.scenarios,
            rng,
        )?;
        let summary = simulation.summary();
        tracing::info!(
            "{}: {}-day forecast, P(up) {:.2}, risk {:?}",
            symbol,
            simulation.horizon(),
            summary.probability_of_profit,
            summary.risk_level
        );
        Ok(Forecast {
            symbol: symbol.to_string(),
            bear_band: simulation.percentile_band(5.0),
            bull_band: simulation.percentile_band(95.0),
            summary,
            simulation,
        })
    }

    /// Random-weight search over every asset in the table.
    pub fn optimize<R: Rng + ?Sized>(
        &self,
        table: &PriceTable,
        rng: &mut R,
    ) -> Result<OptimizationResult, AnalysisError> {
        let matrix = PriceSeriesAdapter::price_matrix(table)?;
        optimizer::optimize(&matrix, &self.config, rng)
    }

    /// Relative performance and price correlation across the table's assets.
    pub fn compare(&self, table: &PriceTable) -> Result<Comparison, AnalysisError> {
        let matrix = PriceSeriesAdapter::price_matrix(table)?;
        if matrix.asset_count() == 0 {
            return Err(AnalysisError::InsufficientAssets {
                required: 1,
                available: 0,
            });
        }
        Ok(Comparison {
            relative_performance: market::relative_performance(&matrix),
            correlation: market::correlation_matrix(&matrix),
            symbols: matrix.symbols,
            timestamps: matrix.timestamps,
        })
    }

    fn simple_returns_of(
        &self,
        table: &PriceTable,
        symbol: &str,
    ) -> Result<ReturnSeries, AnalysisError> {
        let series = PriceSeriesAdapter::extract(table, symbol)?;
        Ok(returns::simple_returns(series.prices()))
    }

    fn analyze_with(
        &self,
        table: &PriceTable,
        symbol: &str,
        benchmark: Option<&ReturnSeries>,
    ) -> Result<AssetAnalysis, AnalysisError> {
        let series = PriceSeriesAdapter::extract(table, symbol)?;
        if series.len() < self.config.min_observations {
            return Err(AnalysisError::insufficient(
                self.config.min_observations,
                series.len(),
            ));
        }
        let prices = series.prices();

        let log = returns::log_returns(prices, self.config.log_epsilon);
        let simple = returns::simple_returns(prices);
        let log_return_stats = statistics::descriptive_stats(log.values(), &self.config)?;
        let risk = risk::evaluate(
            simple.values(),
            benchmark.map(ReturnSeries::values),
            &self.config,
        )?;

        let snapshot = match market::MarketSnapshot::from_series(&series) {
            Ok(s) => Some(s),
            Err(AnalysisError::Schema(reason)) => {
                tracing::debug!("No snapshot for {}: {}", symbol, reason);
                None
            }
            Err(e) => return Err(e),
        };
        let latest_ma = |window| -> Result<Option<f64>, AnalysisError> {
            Ok(market::moving_average(prices, window)?.last().copied().flatten())
        };

        Ok(AssetAnalysis {
            symbol: symbol.to_string(),
            price_field: series.price_field(),
            observations: series.len(),
            last_price: series.last_price().unwrap_or_default(),
            volatility_regime: VolatilityRegime::classify(risk.annualized_volatility),
            log_return_stats,
            risk,
            snapshot,
            moving_average_short: latest_ma(SHORT_MA)?,
            moving_average_long: latest_ma(LONG_MA)?,
        })
    }
}

impl Default for QuantAnalysisEngine {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}
