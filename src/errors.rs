//! Unified error types and result handling.
//!
//! Every fallible operation in the crate returns [`Result`]. Only a few
//! variants are fatal for a report request; see [`Error::is_request_fatal`].

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable cause
        message: String,
    },

    /// Command-line input could not be understood
    #[error("{message}")]
    InvalidArguments {
        /// Usage hint or the offending argument
        message: String,
    },

    /// Any failure reported by the ORM or the underlying driver
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Caller may not view any data for this request
    #[error("Access denied: {reason}")]
    AccessDenied {
        /// Why access was refused
        reason: String,
    },

    /// The caller has no access profile provisioned
    #[error("No access profile for user {user_id}")]
    ProfileNotFound {
        /// Caller identity that was looked up
        user_id: i64,
    },

    /// A date string could not be parsed
    #[error("Invalid date input: {input:?}")]
    InvalidDateInput {
        /// The raw input
        input: String,
    },

    /// A filter combination produced no rows
    #[error("No data for {section}")]
    EmptyResult {
        /// Name of the section or operation that came back empty
        section: String,
    },

    /// An aggregation exceeded its time budget
    #[error("Aggregation timed out: {section}")]
    AggregationTimeout {
        /// Name of the aggregation that timed out
        section: String,
    },

    /// Raw console input violated the read-only policy
    #[error("Query rejected: {reason}")]
    UnauthorizedQuery {
        /// User-visible reason
        reason: String,
    },

    /// A bulk-load batch was malformed
    #[error("Invalid load batch: {message}")]
    InvalidBatch {
        /// Human-readable cause
        message: String,
    },

    /// I/O failure while writing an export
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error must abort the whole request.
    ///
    /// Identity, authorization and console-policy failures are fatal; everything
    /// else is expected to be absorbed by the section that produced it.
    #[must_use]
    pub const fn is_request_fatal(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied { .. } | Self::ProfileNotFound { .. } | Self::UnauthorizedQuery { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_fatal_classification() {
        assert!(
            Error::AccessDenied {
                reason: "none".to_string()
            }
            .is_request_fatal()
        );
        assert!(Error::ProfileNotFound { user_id: 7 }.is_request_fatal());
        assert!(
            Error::UnauthorizedQuery {
                reason: "DROP".to_string()
            }
            .is_request_fatal()
        );
        assert!(
            !Error::AggregationTimeout {
                section: "tickets".to_string()
            }
            .is_request_fatal()
        );
        assert!(
            !Error::EmptyResult {
                section: "products".to_string()
            }
            .is_request_fatal()
        );
    }

    #[test]
    fn test_invalid_arguments_display_is_bare() {
        let err = Error::InvalidArguments {
            message: "usage: sales-pulse <view> <user_id>".to_string(),
        };
        assert_eq!(err.to_string(), "usage: sales-pulse <view> <user_id>");
        assert!(!err.is_request_fatal());
    }
}
