use thiserror::Error;

/// Failures surfaced by report generation.
///
/// Cache failures never appear here; they degrade to recomputation.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Record store unavailable: {0:#}")]
    StoreUnavailable(#[source] anyhow::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// A write that would duplicate a unique record.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Conflict(pub String);
