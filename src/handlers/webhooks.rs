//! Inbound gateway webhook handler.
//!
//! The gateway POSTs signed JSON events here. The raw body bytes are
//! handed to the reconciler untouched - the HMAC must be computed over the
//! payload exactly as received, so no JSON extractor may run first.

use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode};

use crate::error::AppError;
use crate::state::AppState;

/// Signature header the gateway attaches to each delivery.
const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Receive a gateway webhook.
///
/// # Response
///
/// Always 200 OK once the delivery has been examined - including for
/// rejected signatures and unhandled event types - so the gateway does not
/// hammer the endpoint with retries for payloads that will never be
/// accepted. The rejection reason is logged instead. Only infrastructure
/// failures return 5xx, which makes the gateway redeliver into the
/// idempotent reconciler.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let disposition = state.reconciler.process_webhook(&body, signature).await?;
    tracing::debug!(?disposition, "webhook delivery handled");

    Ok(StatusCode::OK)
}
