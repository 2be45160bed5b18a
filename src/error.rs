use thiserror::Error;

/// Failure kinds the analysis entry point distinguishes for callers. All
/// other errors flow through `anyhow` untyped.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no performance data found in the analysis window; import an export file first")]
    NoData,

    #[error("failed to persist finding for keyword {keyword}")]
    Persistence { keyword: String },
}
