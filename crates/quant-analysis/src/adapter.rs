use std::collections::BTreeMap;

use analysis_core::{AnalysisError, AssetSeries, FieldColumns, PriceField, PriceTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical prices of several assets over the rows where all of them traded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMatrix {
    pub symbols: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
    /// One price column per symbol, same order as `symbols`.
    pub prices: Vec<Vec<f64>>,
}

impl PriceMatrix {
    pub fn asset_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Turns a normalized price table into clean per-asset series.
pub struct PriceSeriesAdapter;

impl PriceSeriesAdapter {
    /// Single-asset OHLCV series for `symbol`, rows with any missing field dropped.
    ///
    /// Columns that are missing on every row (for example an adjusted close a
    /// provider never filled in) are treated as absent rather than emptying
    /// the whole table.
    pub fn extract(table: &PriceTable, symbol: &str) -> Result<AssetSeries, AnalysisError> {
        let columns = table.columns(symbol).ok_or_else(|| {
            AnalysisError::DataNotFound(format!("{} not present at either column level", symbol))
        })?;
        let present: Vec<(&PriceField, &Vec<Option<f64>>)> = columns
            .iter()
            .filter(|(_, values)| values.iter().any(|v| v.is_some_and(f64::is_finite)))
            .collect();
        if AssetSeries::canonical_field(present.iter().map(|(f, _)| **f)).is_none() {
            return Err(AnalysisError::Schema(format!(
                "{}: neither Adj Close nor Close present",
                symbol
            )));
        }

        let keep: Vec<usize> = (0..table.len())
            .filter(|&row| {
                present
                    .iter()
                    .all(|(_, values)| values[row].is_some_and(f64::is_finite))
            })
            .collect();
        if keep.is_empty() {
            return Err(AnalysisError::DataNotFound(format!(
                "{}: no complete rows",
                symbol
            )));
        }
        tracing::debug!(
            "{}: kept {} of {} rows",
            symbol,
            keep.len(),
            table.len()
        );

        let timestamps = keep.iter().map(|&row| table.timestamps()[row]).collect();
        let fields: BTreeMap<PriceField, Vec<f64>> = present
            .iter()
            .map(|(field, values)| {
                let clean = keep.iter().filter_map(|&row| values[row]).collect();
                (**field, clean)
            })
            .collect();

        AssetSeries::new(symbol, timestamps, fields)
    }

    /// Canonical price of every asset on the rows where all assets have one.
    ///
    /// Assets without a usable price column are left out with a warning; the
    /// caller decides whether the remaining count is enough.
    pub fn price_matrix(table: &PriceTable) -> Result<PriceMatrix, AnalysisError> {
        let mut symbols = Vec::new();
        let mut columns: Vec<&Vec<Option<f64>>> = Vec::new();
        for symbol in table.symbols() {
            let Some(fields) = table.columns(symbol) else {
                continue;
            };
            match canonical_column(fields) {
                Some(col) => {
                    symbols.push(symbol.clone());
                    columns.push(col);
                }
                None => tracing::warn!("{}: no price column, excluded from price matrix", symbol),
            }
        }

        let keep: Vec<usize> = (0..table.len())
            .filter(|&row| columns.iter().all(|c| c[row].is_some_and(f64::is_finite)))
            .collect();
        if !columns.is_empty() && keep.is_empty() {
            return Err(AnalysisError::DataNotFound(
                "assets share no complete rows".to_string(),
            ));
        }

        Ok(PriceMatrix {
            symbols,
            timestamps: keep.iter().map(|&row| table.timestamps()[row]).collect(),
            prices: columns
                .iter()
                .map(|c| keep.iter().filter_map(|&row| c[row]).collect())
                .collect(),
        })
    }
}

fn canonical_column(fields: &FieldColumns) -> Option<&Vec<Option<f64>>> {
    let usable = |field: PriceField| {
        fields
            .get(&field)
            .filter(|values| values.iter().any(|v| v.is_some_and(f64::is_finite)))
    };
    usable(PriceField::AdjClose).or_else(|| usable(PriceField::Close))
}
