//! Local CSV price source: one `<SYMBOL>.csv` per asset in a directory.
//!
//! Expected header: `date,open,high,low,close,adj_close,volume`. `adj_close`
//! may be absent or blank. Header labels are matched loosely, so exports
//! using `Adj Close` or `Date` also load.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use analysis_core::{AnalysisError, ColumnKey, PriceField, PriceRequest, PriceSource, RawFrame};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Rows of one symbol keyed by timestamp.
pub type SymbolRows = BTreeMap<DateTime<Utc>, BTreeMap<PriceField, f64>>;

pub struct CsvPriceSource {
    dir: PathBuf,
}

impl CsvPriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PriceSource for CsvPriceSource {
    async fn fetch(&self, request: &PriceRequest) -> Result<Option<RawFrame>, AnalysisError> {
        let mut loaded: Vec<(String, SymbolRows)> = Vec::new();
        for symbol in &request.symbols {
            let path = self.dir.join(format!("{}.csv", symbol));
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("{}: cannot read {}: {}", symbol, path.display(), e);
                    continue;
                }
            };
            let rows = match parse_csv(&text) {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!("{}: skipping {}: {}", symbol, path.display(), e);
                    continue;
                }
            };
            let rows: SymbolRows = rows
                .into_iter()
                .filter(|(ts, _)| in_range(ts.date_naive(), request.start, request.end))
                .collect();
            tracing::info!("{}: {} rows from {}", symbol, rows.len(), path.display());
            if !rows.is_empty() {
                loaded.push((symbol.clone(), rows));
            }
        }

        if loaded.is_empty() {
            return Ok(None);
        }
        align(&loaded).map(Some)
    }
}

fn in_range(date: NaiveDate, start: NaiveDate, end: Option<NaiveDate>) -> bool {
    date >= start && end.map_or(true, |e| date <= e)
}

/// Parse one symbol's CSV export. Blank or unparsable cells are left out.
pub fn parse_csv(text: &str) -> Result<SymbolRows, AnalysisError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AnalysisError::Source(format!("csv header: {}", e)))?
        .clone();
    let date_col = headers
        .iter()
        .position(|h| matches!(h.to_lowercase().as_str(), "date" | "datetime" | "timestamp"))
        .ok_or_else(|| AnalysisError::Schema("csv has no date column".to_string()))?;
    let field_cols: Vec<(usize, PriceField)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| PriceField::parse_label(h).map(|f| (i, f)))
        .collect();

    let mut rows = SymbolRows::new();
    for record in reader.records() {
        let record = record.map_err(|e| AnalysisError::Source(format!("csv row: {}", e)))?;
        let Some(raw_date) = record.get(date_col) else {
            continue;
        };
        let timestamp = parse_timestamp(raw_date)?;
        let values = field_cols
            .iter()
            .filter_map(|&(i, field)| {
                record
                    .get(i)
                    .and_then(|v| v.parse::<f64>().ok())
                    .map(|v| (field, v))
            })
            .collect();
        if rows.insert(timestamp, values).is_some() {
            return Err(AnalysisError::InvalidData(format!(
                "duplicate row for {}",
                raw_date
            )));
        }
    }
    Ok(rows)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AnalysisError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AnalysisError::InvalidData(format!("unrecognised date '{}'", raw)))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AnalysisError::InvalidData(format!("unrecognised date '{}'", raw)))
}

/// Outer join of every symbol on timestamp, as an asset x field frame.
pub fn align(loaded: &[(String, SymbolRows)]) -> Result<RawFrame, AnalysisError> {
    let index: BTreeSet<DateTime<Utc>> = loaded
        .iter()
        .flat_map(|(_, rows)| rows.keys().copied())
        .collect();
    let timestamps: Vec<DateTime<Utc>> = index.into_iter().collect();

    let mut frame = RawFrame::new(timestamps.clone());
    for (symbol, rows) in loaded {
        let fields: BTreeSet<PriceField> = rows.values().flat_map(|r| r.keys().copied()).collect();
        for field in fields {
            let values = timestamps
                .iter()
                .map(|ts| rows.get(ts).and_then(|r| r.get(&field)).copied())
                .collect();
            frame.push_column(
                ColumnKey::Pair(symbol.clone(), field.label().to_string()),
                values,
            )?;
        }
    }
    Ok(frame)
}
