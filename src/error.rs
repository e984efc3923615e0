//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Validation Errors**: Bad bundles, coupons, ids, or request fields
/// - **Conflict Errors**: A duplicate pending payment for the same voter
/// - **Gateway Errors**: Transport failures or rejections from the payment gateway
/// - **Signature Errors**: Webhook payloads that fail HMAC verification
///
/// Note that "already processed" is deliberately *not* an error: a duplicate
/// confirmation of a terminal payment is a successful idempotent no-op,
/// signalled through [`crate::services::store::StatusTransition`].
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request data failed validation before any payment was created.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("{0}")]
    Validation(String),

    /// An un-expired pending payment already exists for this
    /// (voter, event, category) combination.
    ///
    /// Returns HTTP 409 Conflict. The String carries the existing payment's
    /// reference so the caller can resume that charge instead of opening a
    /// duplicate one.
    #[error("A pending payment already exists; reuse reference {0}")]
    DuplicatePending(String),

    /// The payment gateway rejected a call or could not be reached.
    ///
    /// Returns HTTP 502 Bad Gateway. The payment (if one was created)
    /// remains `pending` and can be retried or verified later.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// A webhook payload failed HMAC signature verification.
    ///
    /// Never sent back to the gateway (webhooks are always acknowledged);
    /// only surfaces if signature verification is hit outside the webhook
    /// sink.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// No payment exists for the requested reference.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Payment not found")]
    PaymentNotFound,
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `Validation` → 400 Bad Request
/// - `DuplicatePending` → 409 Conflict
/// - `PaymentNotFound` → 404 Not Found
/// - `InvalidSignature` → 401 Unauthorized
/// - `Gateway` → 502 Bad Gateway
/// - `Database` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::Validation(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::DuplicatePending(_) => (
                StatusCode::CONFLICT,
                "duplicate_pending_payment",
                self.to_string(),
            ),
            AppError::PaymentNotFound => {
                (StatusCode::NOT_FOUND, "payment_not_found", self.to_string())
            }
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                self.to_string(),
            ),
            AppError::Gateway(ref msg) => (StatusCode::BAD_GATEWAY, "gateway_error", msg.clone()),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}
