//! Payment gateway client.
//!
//! Wraps the two outbound gateway calls (initialize a charge, verify a
//! charge) and the HMAC verification of inbound webhook signatures. All
//! amounts cross this boundary in the gateway's minor currency unit, which
//! is also how they are stored, so no conversion arithmetic exists here.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha512;

use crate::error::AppError;
use crate::models::gateway::{GatewayInitResult, GatewayVerifyResult, VerifyStatus};

type HmacSha512 = Hmac<Sha512>;

/// Outbound request timeout. A hung gateway must not pin request handlers.
const GATEWAY_TIMEOUT_SECS: u64 = 10;

/// The external payment gateway boundary.
///
/// Injected into the pipeline and reconciler so tests can substitute a
/// deterministic fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initialize a charge. `amount_cents` is in the gateway's minor
    /// currency unit. Fails with `Gateway` on transport errors, non-2xx
    /// responses, or an explicit failure flag in the response body.
    async fn initialize(
        &self,
        email: &str,
        amount_cents: i64,
        reference: &str,
        callback_url: &str,
        metadata: Value,
    ) -> Result<GatewayInitResult, AppError>;

    /// Verify a charge by reference. A "transaction not found" response is
    /// a normal failed verdict, not an error; only transport-level problems
    /// fail with `Gateway`.
    async fn verify(&self, reference: &str) -> Result<GatewayVerifyResult, AppError>;

    /// Verify an inbound webhook signature against the raw, unparsed
    /// request body.
    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool;
}

/// Check a hex-encoded HMAC-SHA512 signature over the raw body bytes.
///
/// The comparison runs in constant time via `Mac::verify_slice`. Hashing
/// must use the bytes exactly as received; re-serializing parsed JSON
/// produces false negatives.
pub fn signature_matches(secret: &str, raw_body: &[u8], signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&provided).is_ok()
}

/// Paystack-style HTTP gateway client.
///
/// Both calls are authenticated with a bearer secret; the same secret keys
/// the webhook signature check.
pub struct PaystackGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl PaystackGateway {
    pub fn new(base_url: String, secret_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(GATEWAY_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Gateway(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }
}

/// Standard envelope wrapping every gateway response body.
#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

/// Body of the initialize-charge call.
#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    callback_url: &'a str,
    metadata: &'a Value,
}

/// Charge details in a verify response.
#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    id: Option<i64>,
    paid_at: Option<String>,
    gateway_response: Option<String>,
    channel: Option<String>,
    fees: Option<i64>,
    amount: Option<i64>,
    currency: Option<String>,
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(
        &self,
        email: &str,
        amount_cents: i64,
        reference: &str,
        callback_url: &str,
        metadata: Value,
    ) -> Result<GatewayInitResult, AppError> {
        let body = InitializeBody {
            email,
            amount: amount_cents,
            reference,
            callback_url,
            metadata: &metadata,
        };

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("initialize request failed: {e}")))?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(AppError::Gateway(format!(
                "initialize returned HTTP {http_status}"
            )));
        }

        let envelope: GatewayEnvelope<GatewayInitResult> = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("initialize response unreadable: {e}")))?;

        if !envelope.status {
            return Err(AppError::Gateway(format!(
                "initialize rejected: {}",
                envelope.message.unwrap_or_else(|| "no message".to_string())
            )));
        }

        envelope
            .data
            .ok_or_else(|| AppError::Gateway("initialize response missing data".to_string()))
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerifyResult, AppError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("verify request failed: {e}")))?;

        // An unknown reference is a normal failed outcome, not a fault
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(GatewayVerifyResult::not_found());
        }

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(AppError::Gateway(format!(
                "verify returned HTTP {http_status}"
            )));
        }

        let envelope: GatewayEnvelope<VerifyData> = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("verify response unreadable: {e}")))?;

        if !envelope.status {
            // The gateway reports unknown references through the envelope
            // flag as well
            return Ok(GatewayVerifyResult::not_found());
        }

        let data = envelope
            .data
            .ok_or_else(|| AppError::Gateway("verify response missing data".to_string()))?;

        Ok(GatewayVerifyResult {
            status: VerifyStatus::from_label(&data.status),
            transaction_id: data.id,
            paid_at: data.paid_at,
            gateway_response: data.gateway_response,
            channel: data.channel,
            fees_cents: data.fees,
            amount_cents: data.amount,
            currency: data.currency,
        })
    }

    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        signature_matches(&self.secret_key, raw_body, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_is_accepted() {
        let secret = "sk_test_secret";
        let body = br#"{"event":"charge.success","data":{"reference":"vp_1"}}"#;
        let signature = sign(secret, body);

        assert!(signature_matches(secret, body, &signature));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let secret = "sk_test_secret";
        let body = br#"{"event":"charge.success","data":{"reference":"vp_1"}}"#;
        let signature = sign(secret, body);

        let tampered = br#"{"event":"charge.success","data":{"reference":"vp_2"}}"#;
        assert!(!signature_matches(secret, tampered, &signature));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign("sk_test_secret", body);

        assert!(!signature_matches("sk_other_secret", body, &signature));
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        assert!(!signature_matches("secret", b"body", "not-hex-at-all"));
        assert!(!signature_matches("secret", b"body", ""));
    }

    #[test]
    fn reserialized_json_would_not_match_the_raw_bytes() {
        let secret = "sk_test_secret";
        // Raw body with whitespace the gateway happened to send
        let raw = br#"{ "event": "charge.success",  "data": { "reference": "vp_1" } }"#;
        let signature = sign(secret, raw);

        // A round-trip through a JSON parser normalizes the whitespace away
        let value: Value = serde_json::from_slice(raw).unwrap();
        let reserialized = serde_json::to_vec(&value).unwrap();

        assert!(signature_matches(secret, raw, &signature));
        assert!(!signature_matches(secret, &reserialized, &signature));
    }
}
