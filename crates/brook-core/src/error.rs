//! Error types for Brook Core

use crate::types::FetchState;
use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Cache error types
///
/// Errors are `Clone` because a single upstream failure fans out to every
/// pending range request on the resource.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Fetch lifecycle errors
    #[error("fetch already started for this resource")]
    AlreadyStarted,

    #[error("total size reported inconsistently: expected {expected}, upstream reported {reported}")]
    MetadataConflict { expected: u64, reported: u64 },

    #[error("upstream fetch failed: {message}")]
    Upstream { message: String },

    // Request errors
    #[error("resource is in terminal state {state} and accepts no further requests")]
    ResourceUnavailable { state: FetchState },

    #[error("invalid range request: offset {offset}, length {length}")]
    InvalidRequest { offset: u64, length: u64 },

    #[error("requested span [{offset}, {offset}+{length}) extends past the final resource size {total_size}")]
    RangeUnsatisfiable {
        offset: u64,
        length: u64,
        total_size: u64,
    },

    #[error("resource was torn down before the request resolved")]
    Cancelled,

    // Internal errors
    #[error("read at offset {offset} beyond available {available} bytes")]
    OutOfRange { offset: u64, available: u64 },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Upstream {
            message: err.to_string(),
        }
    }
}

impl Error {
    /// Create an upstream error from any displayable cause
    pub fn upstream(cause: impl std::fmt::Display) -> Self {
        Error::Upstream {
            message: cause.to_string(),
        }
    }

    /// Returns true if a caller could sensibly retry with a fresh resource
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Upstream { .. } | Error::ResourceUnavailable { .. } | Error::Cancelled
        )
    }

    /// Returns the error code for telemetry
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::AlreadyStarted => "ALREADY_STARTED",
            Error::MetadataConflict { .. } => "METADATA_CONFLICT",
            Error::Upstream { .. } => "UPSTREAM_FAILURE",
            Error::ResourceUnavailable { .. } => "RESOURCE_UNAVAILABLE",
            Error::InvalidRequest { .. } => "INVALID_REQUEST",
            Error::RangeUnsatisfiable { .. } => "RANGE_UNSATISFIABLE",
            Error::Cancelled => "CANCELLED",
            Error::OutOfRange { .. } => "OUT_OF_RANGE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::AlreadyStarted.error_code(), "ALREADY_STARTED");
        assert_eq!(
            Error::upstream("connection reset").error_code(),
            "UPSTREAM_FAILURE"
        );
        assert_eq!(
            Error::OutOfRange {
                offset: 10,
                available: 5
            }
            .error_code(),
            "OUT_OF_RANGE"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::upstream("timed out").is_recoverable());
        assert!(Error::Cancelled.is_recoverable());
        assert!(!Error::AlreadyStarted.is_recoverable());
        assert!(!Error::MetadataConflict {
            expected: 100,
            reported: 200
        }
        .is_recoverable());
    }
}
