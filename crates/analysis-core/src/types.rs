use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub adj_close: Option<f64>,
    pub volume: f64,
}

/// Named field of a price record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

impl PriceField {
    pub const ALL: [PriceField; 6] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::AdjClose,
        PriceField::Volume,
    ];

    /// Column label as market-data providers print it.
    pub fn label(&self) -> &'static str {
        match self {
            PriceField::Open => "Open",
            PriceField::High => "High",
            PriceField::Low => "Low",
            PriceField::Close => "Close",
            PriceField::AdjClose => "Adj Close",
            PriceField::Volume => "Volume",
        }
    }

    /// Parse a column label, ignoring case, spaces, underscores and dashes.
    pub fn parse_label(label: &str) -> Option<Self> {
        let norm: String = label
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match norm.as_str() {
            "open" => Some(PriceField::Open),
            "high" => Some(PriceField::High),
            "low" => Some(PriceField::Low),
            "close" => Some(PriceField::Close),
            "adjclose" | "adjustedclose" => Some(PriceField::AdjClose),
            "volume" => Some(PriceField::Volume),
            _ => None,
        }
    }

    fn of_bar(&self, bar: &Bar) -> Option<f64> {
        match self {
            PriceField::Open => Some(bar.open),
            PriceField::High => Some(bar.high),
            PriceField::Low => Some(bar.low),
            PriceField::Close => Some(bar.close),
            PriceField::AdjClose => bar.adj_close,
            PriceField::Volume => Some(bar.volume),
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sampling interval of an upstream price request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Minute,
    Hour,
    Day,
    Week,
}

impl Interval {
    /// Observations per year, assuming 252 sessions of 6.5 trading hours.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Interval::Minute => 252.0 * 390.0,
            Interval::Hour => 252.0 * 6.5,
            Interval::Day => 252.0,
            Interval::Week => 52.0,
        }
    }
}

impl FromStr for Interval {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "minute" => Ok(Interval::Minute),
            "1h" | "hour" => Ok(Interval::Hour),
            "1d" | "day" | "daily" => Ok(Interval::Day),
            "1wk" | "1w" | "week" | "weekly" => Ok(Interval::Week),
            other => Err(AnalysisError::InvalidInput(format!("unknown interval '{}'", other))),
        }
    }
}

/// Column label of a raw frame: flat, or two-level with unknown nesting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKey {
    Single(String),
    Pair(String, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawColumn {
    pub key: ColumnKey,
    pub values: Vec<Option<f64>>,
}

/// Price table exactly as an upstream source hands it over.
///
/// Multi-asset downloads arrive with two-level columns, either
/// asset x field or field x asset; missing cells are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFrame {
    pub timestamps: Vec<DateTime<Utc>>,
    pub columns: Vec<RawColumn>,
}

impl RawFrame {
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            timestamps,
            columns: Vec::new(),
        }
    }

    pub fn push_column(
        &mut self,
        key: ColumnKey,
        values: Vec<Option<f64>>,
    ) -> Result<(), AnalysisError> {
        if values.len() != self.timestamps.len() {
            return Err(AnalysisError::InvalidData(format!(
                "column {:?} has {} rows, index has {}",
                key,
                values.len(),
                self.timestamps.len()
            )));
        }
        self.columns.push(RawColumn { key, values });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty() || self.columns.is_empty()
    }

    /// Flat single-asset frame built from bars. `Adj Close` is only emitted
    /// when at least one bar carries it.
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut frame = Self::new(bars.iter().map(|b| b.timestamp).collect());
        let has_adj = bars.iter().any(|b| b.adj_close.is_some());
        for field in PriceField::ALL {
            if field == PriceField::AdjClose && !has_adj {
                continue;
            }
            frame.columns.push(RawColumn {
                key: ColumnKey::Single(field.label().to_string()),
                values: bars.iter().map(|b| field.of_bar(b)).collect(),
            });
        }
        frame
    }
}

/// Column shape of a price table, detected once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    SingleAsset,
    /// Two-level columns, asset identifier on the outer level.
    NestedByAsset,
    /// Two-level columns, field name on the outer level.
    NestedByField,
}

impl TableLayout {
    /// Classify a raw frame's columns.
    ///
    /// For two-level columns the level whose labels parse as price fields is
    /// taken as the field level; on a tie the inner level wins.
    pub fn detect(frame: &RawFrame) -> Result<Self, AnalysisError> {
        if frame.columns.is_empty() {
            return Err(AnalysisError::DataNotFound("price table has no columns".to_string()));
        }
        let singles = frame
            .columns
            .iter()
            .filter(|c| matches!(c.key, ColumnKey::Single(_)))
            .count();
        if singles == frame.columns.len() {
            return Ok(TableLayout::SingleAsset);
        }
        if singles > 0 {
            return Err(AnalysisError::InvalidData(
                "price table mixes flat and two-level columns".to_string(),
            ));
        }

        let mut outer: Vec<&str> = Vec::new();
        let mut inner: Vec<&str> = Vec::new();
        for column in &frame.columns {
            if let ColumnKey::Pair(a, b) = &column.key {
                if !outer.contains(&a.as_str()) {
                    outer.push(a);
                }
                if !inner.contains(&b.as_str()) {
                    inner.push(b);
                }
            }
        }
        let field_share = |labels: &[&str]| {
            labels.iter().filter(|l| PriceField::parse_label(l).is_some()).count() as f64
                / labels.len() as f64
        };
        let outer_share = field_share(outer.as_slice());
        let inner_share = field_share(inner.as_slice());

        if outer_share == 0.0 && inner_share == 0.0 {
            return Err(AnalysisError::Schema(
                "no price field labels at either column level".to_string(),
            ));
        }
        if inner_share >= outer_share {
            Ok(TableLayout::NestedByAsset)
        } else {
            Ok(TableLayout::NestedByField)
        }
    }
}

/// Per-field columns of one asset; cells may be missing.
pub type FieldColumns = BTreeMap<PriceField, Vec<Option<f64>>>;

/// Canonical multi-asset price table.
///
/// Whatever the upstream column shape, assets are stored by identifier with
/// their field columns aligned to one strictly increasing timestamp index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    layout: TableLayout,
    timestamps: Vec<DateTime<Utc>>,
    symbols: Vec<String>,
    assets: BTreeMap<String, FieldColumns>,
}

impl PriceTable {
    /// Detect the layout of `frame` and normalize it.
    ///
    /// A single-asset frame is stored under `default_symbol` (empty when the
    /// source did not name it).
    pub fn from_raw(frame: RawFrame, default_symbol: &str) -> Result<Self, AnalysisError> {
        if frame.is_empty() {
            return Err(AnalysisError::DataNotFound("price table is empty".to_string()));
        }
        ensure_increasing(&frame.timestamps)?;
        let layout = TableLayout::detect(&frame)?;

        let mut symbols: Vec<String> = Vec::new();
        let mut assets: BTreeMap<String, FieldColumns> = BTreeMap::new();
        for column in frame.columns {
            let (symbol, label) = match (&column.key, layout) {
                (ColumnKey::Single(label), _) => (default_symbol.to_string(), label.clone()),
                (ColumnKey::Pair(asset, label), TableLayout::NestedByAsset) => {
                    (asset.clone(), label.clone())
                }
                (ColumnKey::Pair(label, asset), _) => (asset.clone(), label.clone()),
            };
            // Unrecognised fields (dividends, splits, ...) are not needed downstream.
            let Some(field) = PriceField::parse_label(&label) else {
                continue;
            };
            if !symbols.contains(&symbol) {
                symbols.push(symbol.clone());
            }
            let columns = assets.entry(symbol).or_default();
            if columns.insert(field, column.values).is_some() {
                return Err(AnalysisError::InvalidData(format!(
                    "duplicate {} column",
                    field
                )));
            }
        }
        if assets.is_empty() {
            return Err(AnalysisError::Schema("no recognised price fields".to_string()));
        }

        Ok(Self {
            layout,
            timestamps: frame.timestamps,
            symbols,
            assets,
        })
    }

    pub fn from_bars(symbol: &str, bars: &[Bar]) -> Result<Self, AnalysisError> {
        Self::from_raw(RawFrame::from_bars(bars), symbol)
    }

    pub fn layout(&self) -> TableLayout {
        self.layout
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Asset identifiers in first-seen column order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Field columns for `symbol`. A single-asset table whose source did not
    /// name the asset answers for any identifier.
    pub fn columns(&self, symbol: &str) -> Option<&FieldColumns> {
        match (self.assets.get(symbol), self.layout) {
            (Some(columns), _) => Some(columns),
            (None, TableLayout::SingleAsset) => self.assets.get(""),
            (None, _) => None,
        }
    }
}

fn ensure_increasing(timestamps: &[DateTime<Utc>]) -> Result<(), AnalysisError> {
    match timestamps.windows(2).find(|w| w[1] <= w[0]) {
        Some(w) => Err(AnalysisError::InvalidData(format!(
            "timestamps must be strictly increasing ({} follows {})",
            w[1], w[0]
        ))),
        None => Ok(()),
    }
}

/// Clean single-asset OHLCV series: every row has every present field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSeries {
    pub symbol: String,
    timestamps: Vec<DateTime<Utc>>,
    fields: BTreeMap<PriceField, Vec<f64>>,
    price_field: PriceField,
}

impl AssetSeries {
    /// Build from clean, equal-length columns. Adjusted close is preferred
    /// as the canonical price, then close.
    pub fn new(
        symbol: impl Into<String>,
        timestamps: Vec<DateTime<Utc>>,
        fields: BTreeMap<PriceField, Vec<f64>>,
    ) -> Result<Self, AnalysisError> {
        let symbol = symbol.into();
        if let Some((field, col)) = fields.iter().find(|(_, c)| c.len() != timestamps.len()) {
            return Err(AnalysisError::InvalidData(format!(
                "{}: {} column has {} rows, index has {}",
                symbol,
                field,
                col.len(),
                timestamps.len()
            )));
        }
        let price_field = Self::canonical_field(fields.keys().copied()).ok_or_else(|| {
            AnalysisError::Schema(format!("{}: neither Adj Close nor Close present", symbol))
        })?;
        Ok(Self {
            symbol,
            timestamps,
            fields,
            price_field,
        })
    }

    /// `AdjClose` if available, else `Close`.
    pub fn canonical_field(fields: impl IntoIterator<Item = PriceField>) -> Option<PriceField> {
        let mut has_close = false;
        for field in fields {
            match field {
                PriceField::AdjClose => return Some(PriceField::AdjClose),
                PriceField::Close => has_close = true,
                _ => {}
            }
        }
        has_close.then_some(PriceField::Close)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn price_field(&self) -> PriceField {
        self.price_field
    }

    /// Canonical price column.
    pub fn prices(&self) -> &[f64] {
        self.fields
            .get(&self.price_field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.prices().last().copied()
    }

    pub fn has_field(&self, field: PriceField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn column(&self, field: PriceField) -> Result<&[f64], AnalysisError> {
        self.fields
            .get(&field)
            .map(Vec::as_slice)
            .ok_or_else(|| AnalysisError::Schema(format!("{}: no {} column", self.symbol, field)))
    }
}

/// Returns aligned to the rows of the price series they came from.
///
/// `index[i]` is the source row whose return is `values[i]`, so index values
/// are always >= 1. Rows that produced a non-finite return are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub index: Vec<usize>,
    pub values: Vec<f64>,
}

impl ReturnSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Timestamps of the source rows, given the series' source timestamps.
    pub fn timestamps(&self, source: &[DateTime<Utc>]) -> Vec<DateTime<Utc>> {
        self.index
            .iter()
            .filter_map(|&i| source.get(i).copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    fn pair(a: &str, b: &str) -> ColumnKey {
        ColumnKey::Pair(a.to_string(), b.to_string())
    }

    #[test]
    fn test_parse_label_variants() {
        assert_eq!(PriceField::parse_label("Adj Close"), Some(PriceField::AdjClose));
        assert_eq!(PriceField::parse_label("adj_close"), Some(PriceField::AdjClose));
        assert_eq!(PriceField::parse_label("CLOSE"), Some(PriceField::Close));
        assert_eq!(PriceField::parse_label("Dividends"), None);
    }

    #[test]
    fn test_detect_layouts() {
        let mut by_asset = RawFrame::new(days(2));
        by_asset.push_column(pair("AAPL", "Close"), vec![Some(1.0), Some(2.0)]).unwrap();
        by_asset.push_column(pair("MSFT", "Close"), vec![Some(1.0), Some(2.0)]).unwrap();
        assert_eq!(TableLayout::detect(&by_asset).unwrap(), TableLayout::NestedByAsset);

        let mut by_field = RawFrame::new(days(2));
        by_field.push_column(pair("Close", "AAPL"), vec![Some(1.0), Some(2.0)]).unwrap();
        by_field.push_column(pair("Volume", "AAPL"), vec![Some(1.0), Some(2.0)]).unwrap();
        assert_eq!(TableLayout::detect(&by_field).unwrap(), TableLayout::NestedByField);

        let flat = RawFrame::from_bars(&[]);
        assert!(TableLayout::detect(&flat).is_ok());
    }

    #[test]
    fn test_detect_rejects_mixed_columns() {
        let mut frame = RawFrame::new(days(1));
        frame.push_column(pair("AAPL", "Close"), vec![Some(1.0)]).unwrap();
        frame.push_column(ColumnKey::Single("Close".into()), vec![Some(1.0)]).unwrap();
        assert!(matches!(
            TableLayout::detect(&frame),
            Err(AnalysisError::InvalidData(_))
        ));
    }

    #[test]
    fn test_push_column_length_mismatch() {
        let mut frame = RawFrame::new(days(3));
        let err = frame.push_column(pair("AAPL", "Close"), vec![Some(1.0)]);
        assert!(err.is_err());
    }

    #[test]
    fn test_field_by_asset_normalizes_to_same_symbols() {
        let mut frame = RawFrame::new(days(2));
        frame.push_column(pair("Close", "BTC-USD"), vec![Some(1.0), Some(2.0)]).unwrap();
        frame.push_column(pair("Close", "AAPL"), vec![Some(3.0), None]).unwrap();
        let table = PriceTable::from_raw(frame, "").unwrap();
        assert_eq!(table.layout(), TableLayout::NestedByField);
        assert_eq!(table.symbols(), &["BTC-USD".to_string(), "AAPL".to_string()]);
        let aapl = table.columns("AAPL").unwrap();
        assert_eq!(aapl[&PriceField::Close], vec![Some(3.0), None]);
        assert!(table.columns("MSFT").is_none());
    }

    #[test]
    fn test_single_asset_lookup_respects_name() {
        let close = || vec![Some(1.0), Some(2.0)];

        let mut named = RawFrame::new(days(2));
        named.push_column(ColumnKey::Single("Close".into()), close()).unwrap();
        let table = PriceTable::from_raw(named, "AAA").unwrap();
        assert!(table.columns("AAA").is_some());
        assert!(table.columns("SPY").is_none());

        let mut unnamed = RawFrame::new(days(2));
        unnamed.push_column(ColumnKey::Single("Close".into()), close()).unwrap();
        let table = PriceTable::from_raw(unnamed, "").unwrap();
        assert!(table.columns("SPY").is_some());
    }

    #[test]
    fn test_non_increasing_timestamps_rejected() {
        let mut ts = days(3);
        ts[2] = ts[1];
        let mut frame = RawFrame::new(ts);
        frame.push_column(ColumnKey::Single("Close".into()), vec![Some(1.0); 3]).unwrap();
        assert!(matches!(
            PriceTable::from_raw(frame, "X"),
            Err(AnalysisError::InvalidData(_))
        ));
    }

    #[test]
    fn test_canonical_field_prefers_adjusted_close() {
        let fields = [PriceField::Close, PriceField::AdjClose, PriceField::Volume];
        assert_eq!(AssetSeries::canonical_field(fields), Some(PriceField::AdjClose));
        assert_eq!(
            AssetSeries::canonical_field([PriceField::Close]),
            Some(PriceField::Close)
        );
        assert_eq!(AssetSeries::canonical_field([PriceField::Volume]), None);
    }

    #[test]
    fn test_asset_series_without_price_is_schema_error() {
        let mut fields = BTreeMap::new();
        fields.insert(PriceField::Volume, vec![10.0, 20.0]);
        let err = AssetSeries::new("X", days(2), fields).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(_)));
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("1d".parse::<Interval>().unwrap(), Interval::Day);
        assert_eq!("week".parse::<Interval>().unwrap().periods_per_year(), 52.0);
        assert!("fortnight".parse::<Interval>().is_err());
    }
}
