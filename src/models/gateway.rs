//! Typed payloads for the payment gateway boundary.
//!
//! The gateway speaks loosely-structured JSON; everything that crosses into
//! this service is parsed into the explicit types below so the reconciler's
//! branching is exhaustively checked by the compiler instead of string
//! lookups into free-form maps.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Result of a successful charge initialization.
///
/// The voter is redirected to `authorization_url` to complete payment on
/// the gateway's hosted checkout page.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInitResult {
    pub authorization_url: String,
    pub access_code: String,
}

/// Charge status as reported by the gateway's verify endpoint.
///
/// Anything that is not an explicit success settles the payment as failed;
/// a transport error (which never produces a `VerifyStatus`) leaves it
/// pending instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Success,
    Failed,
    /// Statuses this service does not recognize (e.g. "abandoned")
    Other,
}

impl VerifyStatus {
    pub fn from_label(label: &str) -> Self {
        match label {
            "success" => VerifyStatus::Success,
            "failed" => VerifyStatus::Failed,
            _ => VerifyStatus::Other,
        }
    }
}

/// Result of verifying a charge by reference.
///
/// All fields except `status` are passthrough metadata appended to the
/// payment's `gateway_data` for audit; absent fields are simply omitted.
#[derive(Debug, Clone)]
pub struct GatewayVerifyResult {
    pub status: VerifyStatus,
    pub transaction_id: Option<i64>,
    pub paid_at: Option<String>,
    pub gateway_response: Option<String>,
    pub channel: Option<String>,
    pub fees_cents: Option<i64>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
}

impl GatewayVerifyResult {
    /// A failed verdict with no metadata, used when the gateway reports the
    /// reference as unknown ("transaction not found" is a normal outcome,
    /// not a fault).
    pub fn not_found() -> Self {
        Self {
            status: VerifyStatus::Failed,
            transaction_id: None,
            paid_at: None,
            gateway_response: Some("transaction not found".to_string()),
            channel: None,
            fees_cents: None,
            amount_cents: None,
            currency: None,
        }
    }

    /// Gateway metadata to append to the payment record.
    pub fn gateway_metadata(&self) -> Value {
        json!({
            "transaction_id": self.transaction_id,
            "paid_at": self.paid_at,
            "gateway_response": self.gateway_response,
            "channel": self.channel,
            "fees": self.fees_cents,
            "amount": self.amount_cents,
            "currency": self.currency,
            "webhook_verified": false,
        })
    }
}

/// An inbound webhook event, parsed after signature verification.
///
/// The gateway tags events with an `event` field; only the two charge
/// outcomes drive state transitions. Everything else deserializes into
/// `Other` and is acknowledged without side effects.
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
pub enum GatewayWebhookEvent {
    #[serde(rename = "charge.success")]
    ChargeSuccess { data: WebhookChargeData },

    #[serde(rename = "charge.failed")]
    ChargeFailed { data: WebhookChargeData },

    #[serde(other)]
    Other,
}

/// Charge details carried inside a webhook event.
///
/// Only `reference` is required; the remaining fields are audit metadata
/// that the gateway may or may not include.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChargeData {
    pub reference: String,
    pub id: Option<i64>,
    pub status: Option<String>,
    pub paid_at: Option<String>,
    pub gateway_response: Option<String>,
    pub channel: Option<String>,
    pub fees: Option<i64>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl WebhookChargeData {
    /// Gateway metadata to append to the payment record. Marked as
    /// webhook-verified since the payload arrived under a valid signature.
    pub fn gateway_metadata(&self) -> Value {
        json!({
            "transaction_id": self.id,
            "paid_at": self.paid_at,
            "gateway_response": self.gateway_response,
            "channel": self.channel,
            "fees": self.fees,
            "amount": self.amount,
            "currency": self.currency,
            "webhook_verified": true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_success_event_parses() {
        let raw = r#"{
            "event": "charge.success",
            "data": {
                "id": 302961,
                "reference": "vp_deadbeef",
                "status": "success",
                "amount": 10000,
                "currency": "GHS",
                "channel": "mobile_money",
                "fees": 150,
                "paid_at": "2025-06-01T12:00:00.000Z",
                "gateway_response": "Approved"
            }
        }"#;

        match serde_json::from_str::<GatewayWebhookEvent>(raw).unwrap() {
            GatewayWebhookEvent::ChargeSuccess { data } => {
                assert_eq!(data.reference, "vp_deadbeef");
                assert_eq!(data.amount, Some(10000));
                assert!(data.gateway_metadata()["webhook_verified"].as_bool().unwrap());
            }
            other => panic!("expected charge.success, got {:?}", other),
        }
    }

    #[test]
    fn charge_failed_event_parses_with_sparse_data() {
        let raw = r#"{"event":"charge.failed","data":{"reference":"vp_cafe"}}"#;

        match serde_json::from_str::<GatewayWebhookEvent>(raw).unwrap() {
            GatewayWebhookEvent::ChargeFailed { data } => {
                assert_eq!(data.reference, "vp_cafe");
                assert_eq!(data.status, None);
            }
            other => panic!("expected charge.failed, got {:?}", other),
        }
    }

    #[test]
    fn unknown_event_types_map_to_other() {
        let raw = r#"{"event":"transfer.success","data":{"reference":"ignored"}}"#;
        assert!(matches!(
            serde_json::from_str::<GatewayWebhookEvent>(raw).unwrap(),
            GatewayWebhookEvent::Other
        ));
    }

    #[test]
    fn verify_status_labels() {
        assert_eq!(VerifyStatus::from_label("success"), VerifyStatus::Success);
        assert_eq!(VerifyStatus::from_label("failed"), VerifyStatus::Failed);
        assert_eq!(VerifyStatus::from_label("abandoned"), VerifyStatus::Other);
    }
}
