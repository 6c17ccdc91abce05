use thiserror::Error;

/// Errors that stop an analysis run before (or instead of) producing a population.
///
/// Provider failures are not represented here: they are absorbed per cell and recorded as
/// degradation on the affected [`crate::population::ScoredCell`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("invalid region: {0}")]
    InvalidRegion(String),
    #[error("invalid analysis parameters: {0}")]
    InvalidParameters(String),
    #[error("grid of {cells} cells exceeds the limit of {limit}")]
    GridTooDense { cells: usize, limit: usize },
    #[error("session '{0}' already has an analysis in flight")]
    SessionBusy(String),
    #[error("analysis was cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub(crate) fn invalid_region(msg: impl Into<String>) -> Self {
        AnalysisError::InvalidRegion(msg.into())
    }

    pub(crate) fn invalid_parameters(msg: impl Into<String>) -> Self {
        AnalysisError::InvalidParameters(msg.into())
    }
}
