use super::*;
use analysis_core::{Bar, ColumnKey, Interval, RawFrame};
use approx::assert_relative_eq;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone};

fn timestamps(n: usize) -> Vec<DateTime<Utc>> {
    let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

/// Deterministic wiggle around a trend; no two days repeat.
fn path(n: usize, start: f64, trend: f64, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            start * (1.0 + trend * t + 0.02 * (t * 0.7 + phase).sin())
        })
        .collect()
}

fn bars(prices: &[f64]) -> Vec<Bar> {
    timestamps(prices.len())
        .into_iter()
        .zip(prices)
        .map(|(timestamp, &close)| Bar {
            timestamp,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            adj_close: None,
            volume: 1_000.0,
        })
        .collect()
}

fn multi_asset_table(n: usize) -> PriceTable {
    let mut frame = RawFrame::new(timestamps(n));
    for (symbol, prices) in [
        ("AAA", path(n, 100.0, 0.002, 0.0)),
        ("BBB", path(n, 40.0, -0.001, 1.3)),
        ("SPY", path(n, 400.0, 0.001, 2.1)),
    ] {
        frame
            .push_column(
                ColumnKey::Pair(symbol.to_string(), "Close".to_string()),
                prices.into_iter().map(Some).collect(),
            )
            .unwrap();
    }
    PriceTable::from_raw(frame, "").unwrap()
}

fn engine() -> QuantAnalysisEngine {
    QuantAnalysisEngine::new(AnalysisConfig {
        seed: Some(2024),
        portfolio_samples: 1000,
        scenarios: 200,
        ..AnalysisConfig::default()
    })
}

#[test]
fn test_constant_growth_scenario() {
    let prices = [100.0, 105.0, 110.25];
    let log = returns::log_returns(&prices, returns::LOG_EPSILON);
    let stats = statistics::descriptive_stats(log.values(), &AnalysisConfig::default()).unwrap();
    assert_relative_eq!(stats.mean, 0.04879, epsilon = 1e-5);
    assert_relative_eq!(stats.annualized_return, 12.29, epsilon = 0.01);
}

#[test]
fn test_flat_series_scenario() {
    let prices = [50.0, 50.0, 50.0, 50.0];
    let simple = returns::simple_returns(&prices);
    assert_eq!(simple.values(), &[0.0, 0.0, 0.0]);
    let report = risk::evaluate(simple.values(), None, &AnalysisConfig::default()).unwrap();
    assert!(report.sharpe_ratio.is_degenerate());
    assert_eq!(report.sharpe_ratio.value(), 0.0);
    assert_eq!(report.annualized_volatility, 0.0);
}

#[test]
fn test_analyze_asset_with_self_benchmark() {
    let table = multi_asset_table(120);
    let analysis = engine().analyze_asset(&table, "AAA", Some("AAA")).unwrap();
    assert_eq!(analysis.observations, 120);
    assert_eq!(analysis.price_field, PriceField::Close);
    assert_relative_eq!(analysis.risk.beta.unwrap().value(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(analysis.risk.alpha.unwrap(), 0.0, epsilon = 1e-12);
    assert_eq!(analysis.risk.drawdown.len(), 119);
    assert!(analysis.risk.max_drawdown <= 0.0);
    // Close-only table: no high/low/volume for a snapshot
    assert!(analysis.snapshot.is_none());
    assert!(analysis.moving_average_short.is_some());
    assert!(analysis.moving_average_long.is_some());
}

#[test]
fn test_analyze_asset_requires_min_observations() {
    let table = multi_asset_table(10);
    let err = engine().analyze_asset(&table, "AAA", None).unwrap_err();
    assert_eq!(err, AnalysisError::InsufficientData { required: 30, available: 10 });
}

#[test]
fn test_batch_skips_bad_assets() {
    let table = multi_asset_table(60);
    let symbols = vec!["AAA".to_string(), "MISSING".to_string(), "BBB".to_string()];
    let entries = engine().analyze_batch(&table, &symbols, Some("SPY"));
    assert_eq!(entries.len(), 3);
    assert!(entries[0].result.is_ok());
    assert!(matches!(entries[1].result, Err(AnalysisError::DataNotFound(_))));
    assert!(entries[1].result.as_ref().unwrap_err().is_data_warning());
    let bbb = entries[2].result.as_ref().unwrap();
    assert!(bbb.risk.beta.is_some());
}

#[test]
fn test_batch_with_missing_benchmark_still_runs() {
    let table = multi_asset_table(60);
    let entries = engine().analyze_batch(&table, &["AAA".to_string()], Some("QQQ"));
    let aaa = entries[0].result.as_ref().unwrap();
    assert!(aaa.risk.beta.is_none());
}

#[test]
fn test_batch_with_short_benchmark_still_runs() {
    let n = 60;
    let mut frame = RawFrame::new(timestamps(n));
    frame
        .push_column(
            ColumnKey::Pair("AAA".to_string(), "Close".to_string()),
            path(n, 100.0, 0.002, 0.0).into_iter().map(Some).collect(),
        )
        .unwrap();
    let mut spy = vec![None; n];
    spy[n - 1] = Some(400.0);
    frame
        .push_column(ColumnKey::Pair("SPY".to_string(), "Close".to_string()), spy)
        .unwrap();
    let table = PriceTable::from_raw(frame, "").unwrap();

    let entries = engine().analyze_batch(&table, &["AAA".to_string()], Some("SPY"));
    let aaa = entries[0].result.as_ref().unwrap();
    assert_eq!(aaa.observations, 60);
    assert!(aaa.risk.beta.is_none() && aaa.risk.alpha.is_none());
}

#[test]
fn test_single_asset_table_does_not_stand_in_for_benchmark() {
    let table = PriceTable::from_bars("AAA", &bars(&path(60, 100.0, 0.002, 0.0))).unwrap();
    let err = engine().analyze_asset(&table, "AAA", Some("SPY")).unwrap_err();
    assert!(matches!(err, AnalysisError::DataNotFound(_)));

    let entries = engine().analyze_batch(&table, &["AAA".to_string()], Some("SPY"));
    let aaa = entries[0].result.as_ref().unwrap();
    assert!(aaa.risk.beta.is_none());
}

#[test]
fn test_snapshot_from_bars() {
    let table = PriceTable::from_bars("XYZ", &bars(&path(40, 20.0, 0.003, 0.5))).unwrap();
    let analysis = engine().analyze_asset(&table, "XYZ", None).unwrap();
    let snapshot = analysis.snapshot.unwrap();
    assert_eq!(snapshot.symbol, "XYZ");
    assert_relative_eq!(snapshot.range.value(), 0.02 / 0.99, epsilon = 1e-9);
    assert!(analysis.moving_average_long.is_none());
}

#[test]
fn test_forecast_first_row_and_dimensions() {
    let table = multi_asset_table(80);
    let eng = engine();
    let forecast = eng.forecast(&table, "BBB", &mut eng.rng()).unwrap();
    let sim = &forecast.simulation;
    assert_eq!(sim.horizon(), 30);
    assert_eq!(sim.scenarios(), 200);
    let last = PriceSeriesAdapter::extract(&table, "BBB").unwrap().last_price().unwrap();
    for s in 0..sim.scenarios() {
        assert_eq!(sim.price(0, s), last);
    }
    assert_eq!(forecast.bear_band.len(), 30);
    assert!(forecast.summary.bear_case <= forecast.summary.bull_case);
}

#[test]
fn test_seeded_engine_is_reproducible() {
    let table = multi_asset_table(80);
    let eng = engine();
    let a = eng.forecast(&table, "AAA", &mut eng.rng()).unwrap();
    let b = eng.forecast(&table, "AAA", &mut eng.rng()).unwrap();
    assert_eq!(a.simulation.grid, b.simulation.grid);

    let p = eng.optimize(&table, &mut eng.rng()).unwrap();
    let q = eng.optimize(&table, &mut eng.rng()).unwrap();
    assert_eq!(p.max_sharpe, q.max_sharpe);
}

#[test]
fn test_optimize_table() {
    let table = multi_asset_table(90);
    let eng = engine();
    let result = eng.optimize(&table, &mut eng.rng()).unwrap();
    assert_eq!(result.symbols, vec!["AAA", "BBB", "SPY"]);
    assert_eq!(result.candidates.len(), 1000);
    for c in &result.candidates {
        assert!((c.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(c.weights.iter().all(|&w| w >= 0.0));
        assert!(result.max_sharpe.sharpe_ratio.value() >= c.sharpe_ratio.value());
        assert!(result.min_volatility.volatility <= c.volatility);
    }
}

#[test]
fn test_optimize_single_asset_not_applicable() {
    let table = PriceTable::from_bars("ONE", &bars(&path(40, 10.0, 0.001, 0.0))).unwrap();
    let eng = engine();
    let err = eng.optimize(&table, &mut eng.rng()).unwrap_err();
    assert!(matches!(err, AnalysisError::InsufficientAssets { available: 1, .. }));
}

#[test]
fn test_compare_assets() {
    let table = multi_asset_table(50);
    let cmp = engine().compare(&table).unwrap();
    assert_eq!(cmp.symbols.len(), 3);
    assert_eq!(cmp.relative_performance[0][0], 0.0);
    assert_eq!(cmp.correlation.nrows(), 3);
    assert_relative_eq!(cmp.correlation[(1, 1)], 1.0, epsilon = 1e-12);
}

struct StaticSource(Option<RawFrame>);

#[async_trait]
impl PriceSource for StaticSource {
    async fn fetch(&self, _request: &PriceRequest) -> Result<Option<RawFrame>, AnalysisError> {
        Ok(self.0.clone())
    }
}

fn request(symbols: &[&str]) -> PriceRequest {
    PriceRequest {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        end: None,
        interval: Interval::Day,
    }
}

#[tokio::test]
async fn test_load_without_data_is_none() {
    let eng = engine();
    assert!(eng.load(&StaticSource(None), &request(&["AAA"])).await.unwrap().is_none());

    let empty = RawFrame::new(Vec::new());
    assert!(eng.load(&StaticSource(Some(empty)), &request(&["AAA"])).await.unwrap().is_none());
}

#[tokio::test]
async fn test_load_single_asset_frame() {
    let frame = RawFrame::from_bars(&bars(&path(35, 10.0, 0.001, 0.2)));
    let eng = engine();
    let table = eng
        .load(&StaticSource(Some(frame)), &request(&["ZZZ"]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.symbols(), &["ZZZ".to_string()]);
    assert!(eng.analyze_asset(&table, "ZZZ", None).is_ok());
}
