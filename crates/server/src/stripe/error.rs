//! Error types for the Stripe API client.

use thiserror::Error;

/// Errors that can occur when calling the Stripe API.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from Stripe.
        message: String,
    },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Failed to parse response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Client misconfigured (bad base URL or key).
    #[error("configuration error: {0}")]
    Config(String),
}

/// Error body returned by Stripe.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorResponse {
    /// Nested error details.
    pub error: ApiError,
}

/// Nested error details.
#[derive(Debug, serde::Deserialize)]
pub struct ApiError {
    /// Error type, e.g. `invalid_request_error`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Error code, e.g. `resource_missing`.
    #[serde(default)]
    pub code: Option<String>,
}
