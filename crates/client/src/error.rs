//! Error types for the Wavecart SDK.
//!
//! One [`Error`] enum covers both layers of the client. Validation and index
//! lookups fail before any network activity (`InvalidArgument`, `NotFound`,
//! `FieldNotLoaded`); everything the server or the wire reports is surfaced
//! unchanged (`Transport`, `Remote`). No variant is ever retried by the SDK:
//! basket mutations are not idempotent, so retry policy belongs to the
//! embedding application.

use thiserror::Error;

use crate::shop::Product;
use wavecart_core::ProductId;

/// Errors that can occur when interacting with the shop API.
#[derive(Debug, Error)]
pub enum Error {
    /// Request failed local validation; no network call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Network-level failure (timeout, connection error, non-2xx response).
    #[error("transport error{}: {message}", fmt_status(*status))]
    Transport {
        /// HTTP status, when the failure happened after a response arrived.
        status: Option<u16>,
        message: String,
    },

    /// The response did not have the `[{command: result}]` envelope shape,
    /// or a payload field had an unexpected type.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The server answered with a well-formed envelope carrying an error.
    #[error("remote error{}: {message}", fmt_code(*code))]
    Remote {
        code: Option<i64>,
        message: String,
    },

    /// JSON (de)serialization failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A locally indexed lookup (category, facet group) had no match.
    /// Never touches the network.
    #[error("not found: {0}")]
    NotFound(String),

    /// Lazy fetching is disabled and the requested field is absent locally.
    #[error("field not loaded: {0}")]
    FieldNotLoaded(String),

    /// A products-by-id batch partially succeeded. Carries the products that
    /// could be materialized alongside the per-id failure reasons.
    #[error("{} of {} requested products failed", failed.len(), found.len() + failed.len())]
    ProductsPartialFailure {
        found: Vec<Product>,
        failed: Vec<(ProductId, String)>,
    },

    /// A basket mutation partially succeeded. Carries the raw order lines
    /// that went through and the ones the server rejected.
    #[error("{} basket order lines failed", failed.len())]
    BasketPartialFailure {
        succeeded: Vec<serde_json::Value>,
        failed: Vec<serde_json::Value>,
    },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

fn fmt_status(status: Option<u16>) -> String {
    status.map_or_else(String::new, |s| format!(" (HTTP {s})"))
}

fn fmt_code(code: Option<i64>) -> String {
    code.map_or_else(String::new, |c| format!(" ({c})"))
}

/// Result type alias for [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument("too many ids, maximum is 200".to_string());
        assert_eq!(
            err.to_string(),
            "invalid argument: too many ids, maximum is 200"
        );

        let err = Error::NotFound("category 42".to_string());
        assert_eq!(err.to_string(), "not found: category 42");
    }

    #[test]
    fn test_transport_display_with_status() {
        let err = Error::Transport {
            status: Some(502),
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "transport error (HTTP 502): bad gateway");
    }

    #[test]
    fn test_transport_display_without_status() {
        let err = Error::Transport {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn test_remote_display() {
        let err = Error::Remote {
            code: Some(404),
            message: "product not found".to_string(),
        };
        assert_eq!(err.to_string(), "remote error (404): product not found");
    }
}
