//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. Order API handlers return `Result<T, AppError>`;
//! the body is always `{"message": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{CustomerError, InventoryError, OrderPersistenceError};
use crate::stripe::StripeError;

/// Application-level error type for the order API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Stripe API operation failed.
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),

    /// Customer resolution failed.
    #[error("Customer error: {0}")]
    Customer(#[from] CustomerError),

    /// Order could not be written.
    #[error("Order error: {0}")]
    Order(#[from] OrderPersistenceError),

    /// Stock adjustment failed.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Inventory(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Stripe(StripeError::NotFound(_)) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Stripe(_) => StatusCode::BAD_GATEWAY,
            Self::Customer(err) => match err {
                CustomerError::MissingCustomerDetails | CustomerError::InvalidEmail(_) => {
                    StatusCode::BAD_REQUEST
                }
                CustomerError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Order(err) => match err {
                OrderPersistenceError::MissingFields | OrderPersistenceError::InvalidItem { .. } => {
                    StatusCode::BAD_REQUEST
                }
                OrderPersistenceError::DuplicatePaymentEvent(_) => StatusCode::CONFLICT,
                OrderPersistenceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Stripe(StripeError::NotFound(_)) => "Payment record not found".to_string(),
            Self::Stripe(_) => "External service error".to_string(),
            Self::Customer(err @ (CustomerError::MissingCustomerDetails | CustomerError::InvalidEmail(_))) => {
                err.to_string()
            }
            Self::Order(err) if !matches!(err, OrderPersistenceError::Repository(_)) => {
                err.to_string()
            }
            Self::NotFound(msg) | Self::BadRequest(msg) => msg.clone(),
            // Don't expose internal error details to clients
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "message": self.message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
