use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data: need at least {required} observations, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Data not found: {0}")]
    DataNotFound(String),

    #[error("Not applicable: need at least {required} assets, got {available}")]
    InsufficientAssets { required: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Price source error: {0}")]
    Source(String),
}

impl AnalysisError {
    pub fn insufficient(required: usize, available: usize) -> Self {
        AnalysisError::InsufficientData { required, available }
    }

    /// True for per-asset data problems a batch caller should report and skip.
    pub fn is_data_warning(&self) -> bool {
        matches!(
            self,
            AnalysisError::InsufficientData { .. }
                | AnalysisError::Schema(_)
                | AnalysisError::DataNotFound(_)
                | AnalysisError::InvalidData(_)
        )
    }
}
