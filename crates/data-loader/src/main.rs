//! data-loader: run the quant engine over local CSV price histories.
//!
//! Each symbol is read from `<data-dir>/<SYMBOL>.csv`; results are printed as JSON.
//!
//! Usage:
//!   cargo run -p data-loader -- analyze  --symbols AAPL MSFT --benchmark SPY
//!   cargo run -p data-loader -- forecast --symbols BTC-USD --data-dir ./data
//!   cargo run -p data-loader -- optimize --symbols AAPL GLD BTC-USD --start 2022-01-01
//!   cargo run -p data-loader -- compare  --symbols AAPL MSFT GOOGL

mod csv_source;

use analysis_core::{AnalysisConfig, AnalysisError, Interval, PriceRequest};
use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use quant_analysis::QuantAnalysisEngine;
use serde_json::json;

use csv_source::CsvPriceSource;

/// Default lookback when `--start` is not given.
const DEFAULT_LOOKBACK_DAYS: i64 = 365;

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  data-loader analyze  --symbols A B ... [--benchmark SPY]");
    eprintln!("  data-loader forecast --symbols A");
    eprintln!("  data-loader optimize --symbols A B ...");
    eprintln!("  data-loader compare  --symbols A B ...");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --data-dir DIR     Directory of <SYMBOL>.csv files (default: data)");
    eprintln!("  --start YYYY-MM-DD First date (default: {} days ago)", DEFAULT_LOOKBACK_DAYS);
    eprintln!("  --end YYYY-MM-DD   Last date (default: latest)");
    eprintln!("  --interval 1d      Sampling interval: 1m, 1h, 1d, 1wk");
    eprintln!();
    eprintln!("Tunables are read from QUANT_* environment variables or a .env file.");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "data_loader=info,quant_analysis=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).filter(|c| !c.starts_with("--")).cloned() else {
        usage();
    };
    if !matches!(command.as_str(), "analyze" | "forecast" | "optimize" | "compare") {
        usage();
    }

    let symbols: Vec<String> = match args.iter().position(|a| a == "--symbols") {
        Some(idx) => args[idx + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .map(|s| s.to_uppercase())
            .collect(),
        None => usage(),
    };
    if symbols.is_empty() {
        usage();
    }
    let benchmark = flag_value(&args, "--benchmark").map(str::to_uppercase);
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("data");

    let start = match flag_value(&args, "--start") {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").context("invalid --start")?,
        None => (Utc::now() - Duration::days(DEFAULT_LOOKBACK_DAYS)).date_naive(),
    };
    let end = flag_value(&args, "--end")
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("invalid --end")?;

    let mut config = AnalysisConfig::from_env().context("invalid QUANT_* configuration")?;
    let interval = match flag_value(&args, "--interval") {
        Some(raw) => {
            let interval: Interval = raw.parse()?;
            config = config.with_interval(interval);
            interval
        }
        None => Interval::Day,
    };

    let mut request_symbols = symbols.clone();
    if let Some(b) = &benchmark {
        if !request_symbols.contains(b) {
            request_symbols.push(b.clone());
        }
    }
    let request = PriceRequest {
        symbols: request_symbols,
        start,
        end,
        interval,
    };

    tracing::info!(
        "data-loader: {} for {} symbols from {}, data_dir={}",
        command,
        symbols.len(),
        start,
        data_dir
    );

    let engine = QuantAnalysisEngine::new(config);
    let source = CsvPriceSource::new(data_dir);
    let Some(table) = engine.load(&source, &request).await? else {
        tracing::warn!("No price data found in {}", data_dir);
        println!("{}", json!({ "status": "no_data" }));
        return Ok(());
    };

    let mut rng = engine.rng();
    let output = match command.as_str() {
        "analyze" => {
            let entries = engine.analyze_batch(&table, &symbols, benchmark.as_deref());
            let assets: Vec<_> = entries
                .into_iter()
                .map(|entry| match entry.result {
                    Ok(analysis) => json!({ "symbol": entry.symbol, "analysis": analysis }),
                    Err(e) => json!({
                        "symbol": entry.symbol,
                        "warning": e.is_data_warning(),
                        "error": e.to_string(),
                    }),
                })
                .collect();
            json!({ "assets": assets })
        }
        "forecast" => {
            let mut forecasts = Vec::new();
            for symbol in &symbols {
                match engine.forecast(&table, symbol, &mut rng) {
                    Ok(f) => forecasts.push(json!({
                        "symbol": f.symbol,
                        "summary": f.summary,
                        "drift": f.simulation.drift,
                        "volatility": f.simulation.volatility,
                        "bear_band": f.bear_band,
                        "bull_band": f.bull_band,
                    })),
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", symbol, e);
                        forecasts.push(json!({ "symbol": symbol, "error": e.to_string() }));
                    }
                }
            }
            json!({ "forecasts": forecasts })
        }
        "optimize" => match engine.optimize(&table, &mut rng) {
            Ok(result) => json!({
                "symbols": result.symbols,
                "observations": result.observations,
                "assets": result.assets,
                "max_sharpe": result.max_sharpe,
                "min_volatility": result.min_volatility,
                "samples": result.candidates.len(),
            }),
            Err(e @ AnalysisError::InsufficientAssets { .. }) => {
                json!({ "status": "not_applicable", "error": e.to_string() })
            }
            Err(e) => return Err(e.into()),
        },
        "compare" => serde_json::to_value(engine.compare(&table)?)?,
        _ => usage(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
