//! Webhook/verification reconciler - the protocol core.
//!
//! Two independent triggers converge here: the gateway's signed webhook
//! push and client-initiated verification polling. Both resolve to the same
//! conditional status transition, and only the transition-causing success
//! call invokes the vote caster. Duplicate webhook deliveries and
//! webhook/poll races are absorbed by the store's compare-and-swap; this
//! module never adds its own locking.

use std::sync::Arc;

use crate::error::AppError;
use crate::models::gateway::{GatewayWebhookEvent, VerifyStatus};
use crate::models::payment::{Payment, PaymentStatus};
use crate::services::gateway::PaymentGateway;
use crate::services::store::{PaymentStore, StatusTransition};
use crate::services::votes::{CastVotes, VoteCaster};

/// How a webhook delivery was handled. Every disposition is acknowledged
/// with HTTP 200 to the sender; the distinction exists for logging and
/// tests.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// This delivery caused the payment's terminal transition
    Processed { reference: String },

    /// The payment was already terminal; no state change
    AlreadyProcessed { reference: String },

    /// Missing or invalid signature; no state change
    SignatureRejected,

    /// Body was not a parseable gateway event; no state change
    Malformed,

    /// A recognized but irrelevant event type; no state change
    Ignored,

    /// A charge event for a reference this service never issued
    UnknownReference { reference: String },
}

/// The idempotent confirmation entry point.
pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    votes: Arc<dyn VoteCaster>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        votes: Arc<dyn VoteCaster>,
    ) -> Self {
        Self {
            store,
            gateway,
            votes,
        }
    }

    /// Handle an inbound webhook delivery.
    ///
    /// The signature is checked over the raw body bytes before anything is
    /// parsed. Rejections perform no state change and are still
    /// acknowledged to the sender; only infrastructure failures bubble up
    /// as errors (so the gateway retries the delivery).
    pub async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookDisposition, AppError> {
        let Some(signature) = signature else {
            tracing::warn!("webhook rejected: missing signature header");
            return Ok(WebhookDisposition::SignatureRejected);
        };

        if !self.gateway.verify_signature(raw_body, signature) {
            tracing::warn!("webhook rejected: signature mismatch");
            return Ok(WebhookDisposition::SignatureRejected);
        }

        let event = match serde_json::from_slice::<GatewayWebhookEvent>(raw_body) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(%error, "webhook rejected: unparseable payload");
                return Ok(WebhookDisposition::Malformed);
            }
        };

        let (reference, new_status, gateway_data) = match event {
            GatewayWebhookEvent::ChargeSuccess { data } => {
                let metadata = data.gateway_metadata();
                (data.reference, PaymentStatus::Success, metadata)
            }
            GatewayWebhookEvent::ChargeFailed { data } => {
                let metadata = data.gateway_metadata();
                (data.reference, PaymentStatus::Failed, metadata)
            }
            GatewayWebhookEvent::Other => {
                tracing::debug!("ignoring unhandled webhook event type");
                return Ok(WebhookDisposition::Ignored);
            }
        };

        match self.settle(&reference, new_status, gateway_data).await {
            Ok(transition) if transition.transitioned => {
                tracing::info!(%reference, status = ?new_status, "webhook settled payment");
                Ok(WebhookDisposition::Processed { reference })
            }
            Ok(_) => {
                tracing::info!(%reference, "webhook for already-processed payment");
                Ok(WebhookDisposition::AlreadyProcessed { reference })
            }
            Err(AppError::PaymentNotFound) => {
                tracing::warn!(%reference, "webhook for unknown payment reference");
                Ok(WebhookDisposition::UnknownReference { reference })
            }
            Err(error) => Err(error),
        }
    }

    /// Handle client-initiated verification polling.
    ///
    /// Terminal payments are returned immediately without contacting the
    /// gateway. For pending ones the gateway's verdict decides the
    /// transition: success confirms, anything else fails. A transport-level
    /// gateway error leaves the payment pending and returns its current
    /// state - "not yet confirmed" is a normal answer, not a fault.
    pub async fn verify(&self, reference: &str) -> Result<Payment, AppError> {
        let payment = self
            .store
            .find_by_reference(reference)
            .await?
            .ok_or(AppError::PaymentNotFound)?;

        if payment.is_terminal() {
            return Ok(payment);
        }

        let result = match self.gateway.verify(reference).await {
            Ok(result) => result,
            Err(AppError::Gateway(message)) => {
                tracing::warn!(%reference, error = %message, "gateway verify failed; payment left pending");
                return Ok(payment);
            }
            Err(error) => return Err(error),
        };

        let new_status = if result.status == VerifyStatus::Success {
            PaymentStatus::Success
        } else {
            PaymentStatus::Failed
        };

        let transition = self
            .settle(reference, new_status, result.gateway_metadata())
            .await?;

        Ok(transition.payment)
    }

    /// The single confirmation path both triggers share: one conditional
    /// status update, then - only if this call caused a success transition -
    /// one vote cast.
    async fn settle(
        &self,
        reference: &str,
        new_status: PaymentStatus,
        gateway_data: serde_json::Value,
    ) -> Result<StatusTransition, AppError> {
        let transition = self
            .store
            .update_status(reference, new_status, gateway_data)
            .await?;

        if !transition.transitioned || transition.payment.status != PaymentStatus::Success {
            return Ok(transition);
        }

        let payment = &transition.payment;
        let cast = CastVotes {
            candidate_id: payment.candidate_id,
            category_id: payment.category_id,
            event_id: payment.event_id,
            vote_count: payment.votes_remaining,
            voter_ip: payment.voter_ip.clone(),
        };

        match self.votes.cast(cast).await {
            Ok(()) => {
                tracing::info!(
                    %reference,
                    votes = payment.votes_remaining,
                    candidate = %payment.candidate_id,
                    "votes cast for confirmed payment"
                );
                let updated = self.store.record_vote_cast(reference).await?;
                Ok(StatusTransition {
                    payment: updated,
                    transitioned: true,
                })
            }
            Err(error) => {
                // Money was captured; keep the success status and leave a
                // reviewable trace instead of losing the payment record.
                tracing::error!(
                    %reference,
                    %error,
                    "vote casting failed after successful payment"
                );
                self.store
                    .record_vote_cast_error(reference, &error.to_string())
                    .await?;
                Ok(transition)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::{
        CountingCaster, FakeGateway, InMemoryStore, new_payment, sign_payload,
    };
    use crate::models::gateway::GatewayVerifyResult;

    const SECRET: &str = "sk_test_secret";

    struct Harness {
        store: Arc<InMemoryStore>,
        gateway: Arc<FakeGateway>,
        caster: Arc<CountingCaster>,
        reconciler: Reconciler,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new(chrono::Duration::minutes(30)));
        let gateway = Arc::new(FakeGateway::new(SECRET));
        let caster = Arc::new(CountingCaster::new());
        let reconciler = Reconciler::new(store.clone(), gateway.clone(), caster.clone());
        Harness {
            store,
            gateway,
            caster,
            reconciler,
        }
    }

    async fn seed_pending(h: &Harness, reference: &str) {
        h.store
            .create(new_payment(reference, "voter@example.com", "10.0.0.1"))
            .await
            .unwrap();
    }

    fn success_body(reference: &str) -> Vec<u8> {
        format!(
            r#"{{"event":"charge.success","data":{{"reference":"{reference}","status":"success","amount":10000}}}}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn webhook_success_settles_payment_and_casts_votes_once() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;

        let body = success_body("vp_ref1");
        let signature = sign_payload(SECRET, &body);

        let disposition = h
            .reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(
            disposition,
            WebhookDisposition::Processed {
                reference: "vp_ref1".to_string()
            }
        );

        let payment = h.store.get("vp_ref1").unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.votes_remaining, 0);
        assert_eq!(payment.gateway_data["webhook_verified"], serde_json::json!(true));

        let casts = h.caster.casts();
        assert_eq!(casts.len(), 1);
        assert_eq!(casts[0].vote_count, 10);
        assert_eq!(casts[0].voter_ip, "10.0.0.1");
    }

    #[tokio::test]
    async fn duplicate_webhook_delivery_is_a_no_op() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;

        let body = success_body("vp_ref1");
        let signature = sign_payload(SECRET, &body);

        h.reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();
        let second = h
            .reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();

        assert_eq!(
            second,
            WebhookDisposition::AlreadyProcessed {
                reference: "vp_ref1".to_string()
            }
        );
        assert_eq!(h.caster.casts().len(), 1);
    }

    #[tokio::test]
    async fn webhook_then_poll_casts_votes_exactly_once() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;

        let body = success_body("vp_ref1");
        let signature = sign_payload(SECRET, &body);
        h.reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();

        // A poll arriving after the webhook resolves must not re-verify or
        // re-cast
        let payment = h.reconciler.verify("vp_ref1").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(h.gateway.verify_calls(), 0);
        assert_eq!(h.caster.casts().len(), 1);
    }

    #[tokio::test]
    async fn poll_confirms_pending_payment_via_gateway() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;
        h.gateway.set_verify_result(GatewayVerifyResult {
            status: VerifyStatus::Success,
            transaction_id: Some(42),
            paid_at: None,
            gateway_response: Some("Approved".to_string()),
            channel: Some("card".to_string()),
            fees_cents: Some(150),
            amount_cents: Some(10_000),
            currency: Some("GHS".to_string()),
        });

        let payment = h.reconciler.verify("vp_ref1").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(h.gateway.verify_calls(), 1);
        assert_eq!(h.caster.casts().len(), 1);
        assert_eq!(
            h.store.get("vp_ref1").unwrap().gateway_data["webhook_verified"],
            serde_json::json!(false)
        );
    }

    #[tokio::test]
    async fn poll_fails_payment_when_gateway_says_failed() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;
        h.gateway.set_verify_result(GatewayVerifyResult::not_found());

        let payment = h.reconciler.verify("vp_ref1").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(h.caster.casts().is_empty());
    }

    #[tokio::test]
    async fn gateway_transport_error_leaves_payment_pending() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;
        // no verify result configured -> the fake returns a Gateway error

        let payment = h.reconciler.verify("vp_ref1").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(h.caster.casts().is_empty());
    }

    #[tokio::test]
    async fn tampered_signature_changes_nothing() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;
        let before = h.store.get("vp_ref1").unwrap();

        let body = success_body("vp_ref1");
        let signature = sign_payload("wrong_secret", &body);

        let disposition = h
            .reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(disposition, WebhookDisposition::SignatureRejected);

        let after = h.store.get("vp_ref1").unwrap();
        assert_eq!(after.status, PaymentStatus::Pending);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.gateway_data, before.gateway_data);
        assert!(h.caster.casts().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_changes_nothing() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;

        let body = success_body("vp_ref1");
        let disposition = h.reconciler.process_webhook(&body, None).await.unwrap();
        assert_eq!(disposition, WebhookDisposition::SignatureRejected);
        assert_eq!(h.store.get("vp_ref1").unwrap().status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn charge_failed_webhook_fails_payment_without_casting() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;

        let body =
            br#"{"event":"charge.failed","data":{"reference":"vp_ref1","status":"failed"}}"#
                .to_vec();
        let signature = sign_payload(SECRET, &body);

        let disposition = h
            .reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(
            disposition,
            WebhookDisposition::Processed {
                reference: "vp_ref1".to_string()
            }
        );
        assert_eq!(h.store.get("vp_ref1").unwrap().status, PaymentStatus::Failed);
        assert!(h.caster.casts().is_empty());
    }

    #[tokio::test]
    async fn unrelated_event_types_are_acknowledged_without_effect() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;

        let body = br#"{"event":"transfer.success","data":{"reference":"vp_ref1"}}"#.to_vec();
        let signature = sign_payload(SECRET, &body);

        let disposition = h
            .reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(disposition, WebhookDisposition::Ignored);
        assert_eq!(h.store.get("vp_ref1").unwrap().status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn webhook_for_unknown_reference_is_acknowledged() {
        let h = harness();

        let body = success_body("vp_ghost");
        let signature = sign_payload(SECRET, &body);

        let disposition = h
            .reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(
            disposition,
            WebhookDisposition::UnknownReference {
                reference: "vp_ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn vote_cast_failure_keeps_success_and_records_the_error() {
        let h = harness();
        seed_pending(&h, "vp_ref1").await;
        h.caster.fail_with("voting window closed");

        let body = success_body("vp_ref1");
        let signature = sign_payload(SECRET, &body);
        let disposition = h
            .reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(
            disposition,
            WebhookDisposition::Processed {
                reference: "vp_ref1".to_string()
            }
        );

        let payment = h.store.get("vp_ref1").unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(
            payment.metadata["vote_cast_error"],
            serde_json::json!("voting window closed")
        );
        // the entitlement was not consumed
        assert_eq!(payment.votes_remaining, 10);

        // a later duplicate delivery still must not re-cast
        let second = h
            .reconciler
            .process_webhook(&body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(
            second,
            WebhookDisposition::AlreadyProcessed {
                reference: "vp_ref1".to_string()
            }
        );
    }
}
