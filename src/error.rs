//! Error taxonomy for the sampling and turn-extraction pipeline.
//!
//! Expected absences (no road near a point, no route between two points,
//! a turn sequence too short for a ratio) are *not* errors; they are data
//! states carried by [`crate::snap::SnapSlot`], [`crate::routes::RouteOutcome`]
//! and `Option<f64>` ratios.

use std::time::Duration;

use thiserror::Error;

/// Faults raised by an external collaborator call (geocoder, road snap,
/// routing).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not complete within its individual timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The service rejected the call because of its rate limit.
    #[error("rate limited by service")]
    RateLimited,

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered successfully but reported an error payload.
    #[error("service error: {0}")]
    Api(String),

    /// The response could not be understood.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The request was refused before it was issued.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The dispatch queue was shut down while the call was waiting.
    #[error("dispatch queue closed")]
    DispatchClosed,

    /// The run was cancelled (budget exhausted or interrupted) before the
    /// call was issued.
    #[error("call cancelled before it was issued")]
    Cancelled,
}

impl ServiceError {
    /// Returns `true` if the fault is worth retrying (timeouts, throttling,
    /// connection problems, server-side errors).
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            ServiceError::Timeout(_) | ServiceError::RateLimited => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Api(_)
            | ServiceError::Parse { .. }
            | ServiceError::InvalidRequest(_)
            | ServiceError::DispatchClosed
            | ServiceError::Cancelled => false,
        }
    }
}

/// Faults raised by the tabular storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("table {table} is missing column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("row has {actual} values but the header has {expected}")]
    RowWidth { expected: usize, actual: usize },

    #[error("table {table}, column '{column}': cannot parse '{value}'")]
    InvalidValue {
        table: String,
        column: String,
        value: String,
    },

    /// An existing table was created with a different column layout.
    #[error("table {table} has header [{existing}], which does not match the configured schema")]
    HeaderMismatch { table: String, existing: String },
}

/// Run-level faults of the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("granularity must be a positive integer, got {0}")]
    InvalidGranularity(i64),

    #[error("malformed boundary polygon: {0}")]
    MalformedPolygon(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("place not found: {0}")]
    PlaceNotFound(String),

    /// Road snapping exhausted its retries for a batch.
    #[error("road snap service unavailable after {attempts} attempts: {source}")]
    SnapServiceUnavailable {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    /// The planned routing call count is above the abort threshold.
    #[error("planned {planned} routing calls exceeds the limit of {limit}")]
    CallBudgetExceeded { planned: u64, limit: u64 },

    #[error("geocoder failed: {0}")]
    Geocoder(#[source] ServiceError),

    #[error("worker task failed: {0}")]
    TaskFailed(String),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        let throttled = ServiceError::Status {
            status: 429,
            body: String::new(),
        };
        let server = ServiceError::Status {
            status: 503,
            body: String::new(),
        };
        let client = ServiceError::Status {
            status: 400,
            body: String::new(),
        };

        assert!(throttled.is_transient());
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    fn test_timeout_and_parse_transience() {
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ServiceError::RateLimited.is_transient());
        assert!(
            !ServiceError::Parse {
                message: "bad".into()
            }
            .is_transient()
        );
        assert!(!ServiceError::Api("denied".into()).is_transient());
    }
}
