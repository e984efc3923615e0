//! Payment initialization pipeline.
//!
//! Converts a voter's intent to buy votes into a pending payment and a
//! gateway checkout redirect:
//!
//! 1. Validate and normalize the request (email, callback URL)
//! 2. Price the requested bundles (prices pinned here)
//! 3. Apply coupon discounts in caller order
//! 4. Reuse an existing un-expired pending charge instead of opening a
//!    duplicate one
//! 5. Screen for fraud signals (advisory annotation only)
//! 6. Persist the payment in `pending`
//! 7. Initialize the gateway charge and capture the redirect
//!
//! Steps 1-3 resolve before anything is persisted, so validation failures
//! never leave partial state.

use std::sync::Arc;

use serde_json::json;
use url::Url;

use crate::error::AppError;
use crate::models::payment::{
    InitializePaymentRequest, InitializeResponse, NewPayment, Payment,
};
use crate::services::catalog::Catalog;
use crate::services::fraud::{self, FraudSettings};
use crate::services::gateway::PaymentGateway;
use crate::services::store::PaymentStore;
use crate::services::{discount, pricing, reference};

/// The client-facing initialize operation, with all collaborators injected.
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    catalog: Arc<dyn Catalog>,
    gateway: Arc<dyn PaymentGateway>,
    fraud_settings: FraudSettings,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        catalog: Arc<dyn Catalog>,
        gateway: Arc<dyn PaymentGateway>,
        fraud_settings: FraudSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            gateway,
            fraud_settings,
        }
    }

    /// Run the full initialization pipeline.
    ///
    /// # Errors
    ///
    /// - `Validation`: bad email/callback/bundles - nothing was persisted
    /// - `DuplicatePending`: a concurrent request created a pending payment
    ///   for the same voter/event/category after the reuse check ran
    /// - `Gateway`: the charge could not be initialized; the pending
    ///   payment remains and a retry will resume it
    pub async fn initialize(
        &self,
        request: InitializePaymentRequest,
        voter_ip: String,
        user_agent: Option<String>,
    ) -> Result<InitializeResponse, AppError> {
        let email = normalize_email(&request.email)?;
        validate_callback_url(&request.callback_url)?;

        let order = pricing::price_order(
            self.catalog.as_ref(),
            &request.bundles,
            request.event_id,
            request.category_id,
        )
        .await?;

        let discounts = discount::apply_coupons(
            self.catalog.as_ref(),
            &request.coupons,
            order.total_price_cents,
            request.event_id,
            request.category_id,
        )
        .await?;

        // One open charge per voter/event/category: resume it rather than
        // charging twice
        if let Some(existing) = self
            .store
            .find_reusable_pending(&email, request.event_id, request.category_id)
            .await?
        {
            tracing::info!(
                reference = %existing.reference,
                voter = %email,
                "reusing existing pending payment"
            );
            return self.resume_pending(existing, &request.callback_url).await;
        }

        let fraud_check =
            fraud::screen(self.store.as_ref(), &email, &voter_ip, &self.fraud_settings).await;
        if !fraud_check.passed {
            tracing::warn!(
                voter = %email,
                ip = %voter_ip,
                reasons = ?fraud_check.reasons,
                "payment flagged by fraud heuristic"
            );
        }

        let payment = self
            .store
            .create(NewPayment {
                reference: reference::generate(),
                voter_email: email.clone(),
                voter_ip,
                user_agent,
                event_id: request.event_id,
                category_id: request.category_id,
                candidate_id: request.candidate_id,
                lines: order.lines,
                coupon_code: discounts.applied.first().map(|c| c.code.clone()),
                original_amount_cents: order.total_price_cents,
                discount_amount_cents: discounts.discount_amount_cents,
                final_amount_cents: discounts.final_amount_cents,
                votes_remaining: order.total_votes,
                fraud_check,
            })
            .await?;

        tracing::info!(
            reference = %payment.reference,
            amount_cents = payment.final_amount_cents,
            votes = payment.votes_remaining,
            "payment created"
        );

        self.open_charge(payment, &request.callback_url).await
    }

    /// Initialize the gateway charge for a payment and capture the
    /// checkout redirect on the record.
    async fn open_charge(
        &self,
        payment: Payment,
        callback_url: &str,
    ) -> Result<InitializeResponse, AppError> {
        let metadata = json!({
            "candidate_id": payment.candidate_id,
            "event_id": payment.event_id,
            "category_id": payment.category_id,
            "votes": payment.votes_remaining,
        });

        let init = self
            .gateway
            .initialize(
                &payment.voter_email,
                payment.final_amount_cents,
                &payment.reference,
                callback_url,
                metadata,
            )
            .await?;

        self.store
            .attach_gateway_data(
                &payment.reference,
                json!({
                    "authorization_url": init.authorization_url,
                    "access_code": init.access_code,
                }),
            )
            .await?;

        Ok(InitializeResponse {
            reference: payment.reference,
            authorization_url: init.authorization_url,
            access_code: init.access_code,
        })
    }

    /// Resume an existing pending charge: hand back its stored redirect,
    /// or re-initialize under the same reference if the earlier gateway
    /// call never completed.
    async fn resume_pending(
        &self,
        existing: Payment,
        callback_url: &str,
    ) -> Result<InitializeResponse, AppError> {
        if let (Some(url), Some(code)) = (existing.authorization_url(), existing.access_code()) {
            return Ok(InitializeResponse {
                reference: existing.reference.clone(),
                authorization_url: url.to_string(),
                access_code: code.to_string(),
            });
        }

        self.open_charge(existing, callback_url).await
    }
}

/// Lower-case and structurally check a voter email.
fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation(
            "a valid voter email is required".to_string(),
        )),
    }
}

/// Validate the post-checkout redirect target.
///
/// HTTPS is required; plain HTTP is allowed for localhost during
/// development. Maximum 2048 characters.
fn validate_callback_url(callback_url: &str) -> Result<(), AppError> {
    if callback_url.len() > 2048 {
        return Err(AppError::Validation(
            "callback URL exceeds 2048 characters".to_string(),
        ));
    }

    let parsed = Url::parse(callback_url)
        .map_err(|_| AppError::Validation("callback URL is not a valid URL".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            if matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "0.0.0.0")) {
                Ok(())
            } else {
                Err(AppError::Validation(
                    "callback URL must use HTTPS outside localhost".to_string(),
                ))
            }
        }
        _ => Err(AppError::Validation(
            "callback URL must use HTTP or HTTPS".to_string(),
        )),
    }
}
