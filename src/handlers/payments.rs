//! Payment HTTP handlers.
//!
//! This module implements the payment-related API endpoints:
//! - POST /api/v1/payments/initialize - Start a vote purchase
//! - GET /api/v1/payments/:reference - Verify / read back a purchase

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};

use crate::error::AppError;
use crate::models::payment::{InitializePaymentRequest, PaymentResponse};
use crate::state::AppState;

/// Initialize a vote purchase.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "voter@example.com",
///   "bundles": [{"bundle_id": "550e8400-...", "quantity": 2}],
///   "coupons": ["EARLYBIRD"],
///   "event_id": "660e8400-...",
///   "category_id": "770e8400-...",
///   "candidate_id": "880e8400-...",
///   "callback_url": "https://vote.example.com/thanks"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "reference": "vp_3f9c2a...",
///   "authorization_url": "https://checkout.paystack.com/abc123",
///   "access_code": "abc123"
/// }
/// ```
///
/// The voter completes payment at `authorization_url`; confirmation arrives
/// later via webhook or by polling the reference.
///
/// # Errors
///
/// - **400**: invalid email/callback/bundle selection
/// - **409**: an un-expired pending payment already exists (reference in message)
/// - **502**: the gateway could not be reached; retry resumes the charge
pub async fn initialize_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InitializePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let voter_ip = client_ip(&headers);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    let response = state
        .payments
        .initialize(request, voter_ip, user_agent)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Verify a payment by reference.
///
/// Safe to call repeatedly: terminal payments are returned as stored, a
/// pending payment triggers one reconciliation pass against the gateway.
/// "Still pending" is a normal response, not an error.
///
/// # Response (200)
///
/// ```json
/// {
///   "reference": "vp_3f9c2a...",
///   "status": "success",
///   "original_amount_cents": 10000,
///   "discount_amount_cents": 2000,
///   "final_amount_cents": 8000,
///   "votes_remaining": 0,
///   "created_at": "2025-06-01T12:00:00Z"
/// }
/// ```
pub async fn get_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state.reconciler.verify(&reference).await?;

    Ok(Json(payment.into()))
}

/// Best-effort client IP: first hop of X-Forwarded-For when present.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
