use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Interval, RawFrame};

/// What to download from a market-data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRequest {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub interval: Interval,
}

/// Trait for historical price providers
///
/// `Ok(None)` means the provider had nothing for the request; callers treat
/// that as "no data", not as a failure.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, request: &PriceRequest) -> Result<Option<RawFrame>, AnalysisError>;
}
