//! Deterministic in-memory fakes for service tests.
//!
//! The in-memory store mirrors the Postgres store's semantics - including
//! the compare-and-swap on `update_status` and jsonb-style shallow merges -
//! so the idempotency and exactly-once properties can be exercised without
//! a database.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha512;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bundle::VoteBundle;
use crate::models::coupon::{Coupon, DiscountType};
use crate::models::gateway::{GatewayInitResult, GatewayVerifyResult};
use crate::models::payment::{FraudVerdict, NewPayment, Payment, PaymentStatus, PricedLine};
use crate::services::catalog::Catalog;
use crate::services::gateway::{PaymentGateway, signature_matches};
use crate::services::store::{PaymentStore, StatusTransition};
use crate::services::votes::{CastVotes, VoteCaster};

/// Sign a webhook payload the way the gateway does.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// A standard pending payment: one bundle, 10000 cents, 10 votes.
pub fn new_payment(reference: &str, email: &str, ip: &str) -> NewPayment {
    NewPayment {
        reference: reference.to_string(),
        voter_email: email.to_string(),
        voter_ip: ip.to_string(),
        user_agent: None,
        event_id: Uuid::new_v4(),
        category_id: Uuid::new_v4(),
        candidate_id: Uuid::new_v4(),
        lines: vec![PricedLine {
            bundle_id: Uuid::new_v4(),
            name: "Pack".to_string(),
            quantity: 1,
            unit_price_cents: 10_000,
            votes_per_unit: 10,
            line_price_cents: 10_000,
            line_votes: 10,
        }],
        coupon_code: None,
        original_amount_cents: 10_000,
        discount_amount_cents: 0,
        final_amount_cents: 10_000,
        votes_remaining: 10,
        fraud_check: FraudVerdict::clean(),
    }
}

/// jsonb-style shallow merge of one object into another.
fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_map {
            target_map.insert(key.clone(), value.clone());
        }
    }
}

/// In-memory payment store with the same conditional-update semantics as
/// the Postgres implementation.
pub struct InMemoryStore {
    pending_ttl: chrono::Duration,
    payments: Mutex<HashMap<String, Payment>>,
}

impl InMemoryStore {
    pub fn new(pending_ttl: chrono::Duration) -> Self {
        Self {
            pending_ttl,
            payments: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, reference: &str) -> Option<Payment> {
        self.payments.lock().unwrap().get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.payments.lock().unwrap().len()
    }

    /// Shift a payment's creation time into the past, for TTL tests.
    pub fn backdate(&self, reference: &str, by: chrono::Duration) {
        let mut payments = self.payments.lock().unwrap();
        if let Some(payment) = payments.get_mut(reference) {
            payment.created_at -= by;
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn create(&self, new_payment: NewPayment) -> Result<Payment, AppError> {
        let now = Utc::now();
        let mut payments = self.payments.lock().unwrap();

        let duplicate = payments.values().find(|p| {
            p.status == PaymentStatus::Pending
                && p.voter_email == new_payment.voter_email
                && p.event_id == new_payment.event_id
                && p.category_id == new_payment.category_id
                && p.created_at > now - self.pending_ttl
        });
        if let Some(existing) = duplicate {
            return Err(AppError::DuplicatePending(existing.reference.clone()));
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            reference: new_payment.reference.clone(),
            status: PaymentStatus::Pending,
            voter_email: new_payment.voter_email,
            voter_ip: new_payment.voter_ip,
            user_agent: new_payment.user_agent,
            event_id: new_payment.event_id,
            category_id: new_payment.category_id,
            candidate_id: new_payment.candidate_id,
            vote_bundles: Json(new_payment.lines),
            coupon_code: new_payment.coupon_code,
            original_amount_cents: new_payment.original_amount_cents,
            discount_amount_cents: new_payment.discount_amount_cents,
            final_amount_cents: new_payment.final_amount_cents,
            votes_remaining: new_payment.votes_remaining,
            gateway_data: json!({}),
            metadata: json!({ "fraud_check": new_payment.fraud_check }),
            created_at: now,
            updated_at: now,
        };
        payments.insert(payment.reference.clone(), payment.clone());
        Ok(payment)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>, AppError> {
        Ok(self.get(reference))
    }

    async fn find_reusable_pending(
        &self,
        voter_email: &str,
        event_id: Uuid,
        category_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let now = Utc::now();
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .values()
            .filter(|p| {
                p.status == PaymentStatus::Pending
                    && p.voter_email == voter_email
                    && p.event_id == event_id
                    && p.category_id == category_id
                    && p.created_at > now - self.pending_ttl
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn update_status(
        &self,
        reference: &str,
        new_status: PaymentStatus,
        gateway_data: Value,
    ) -> Result<StatusTransition, AppError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(reference)
            .ok_or(AppError::PaymentNotFound)?;

        // Compare-and-swap: only a pending payment can transition
        if payment.status != PaymentStatus::Pending {
            return Ok(StatusTransition {
                payment: payment.clone(),
                transitioned: false,
            });
        }

        payment.status = new_status;
        merge(&mut payment.gateway_data, &gateway_data);
        payment.updated_at = Utc::now();
        Ok(StatusTransition {
            payment: payment.clone(),
            transitioned: true,
        })
    }

    async fn attach_gateway_data(
        &self,
        reference: &str,
        gateway_data: Value,
    ) -> Result<Payment, AppError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(reference)
            .ok_or(AppError::PaymentNotFound)?;
        merge(&mut payment.gateway_data, &gateway_data);
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn record_vote_cast(&self, reference: &str) -> Result<Payment, AppError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(reference)
            .ok_or(AppError::PaymentNotFound)?;
        payment.votes_remaining = 0;
        merge(
            &mut payment.metadata,
            &json!({ "votes_cast_at": Utc::now().to_rfc3339() }),
        );
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn record_vote_cast_error(
        &self,
        reference: &str,
        error: &str,
    ) -> Result<(), AppError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(reference)
            .ok_or(AppError::PaymentNotFound)?;
        merge(&mut payment.metadata, &json!({ "vote_cast_error": error }));
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn count_recent_by_ip(
        &self,
        voter_ip: &str,
        window: chrono::Duration,
    ) -> Result<i64, AppError> {
        let now = Utc::now();
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .values()
            .filter(|p| p.voter_ip == voter_ip && p.created_at > now - window)
            .count() as i64)
    }

    async fn sweep_expired(&self) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut payments = self.payments.lock().unwrap();
        let mut stamped = 0;
        for payment in payments.values_mut() {
            if payment.status == PaymentStatus::Pending
                && payment.created_at < now - self.pending_ttl
                && payment.metadata.get("expired_at").is_none()
            {
                merge(
                    &mut payment.metadata,
                    &json!({ "expired_at": now.to_rfc3339() }),
                );
                stamped += 1;
            }
        }
        Ok(stamped)
    }
}

/// A store whose every operation fails, for degraded-path tests.
pub struct FailingStore;

#[async_trait]
impl PaymentStore for FailingStore {
    async fn create(&self, _new_payment: NewPayment) -> Result<Payment, AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn find_by_reference(&self, _reference: &str) -> Result<Option<Payment>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn find_reusable_pending(
        &self,
        _voter_email: &str,
        _event_id: Uuid,
        _category_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn update_status(
        &self,
        _reference: &str,
        _new_status: PaymentStatus,
        _gateway_data: Value,
    ) -> Result<StatusTransition, AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn attach_gateway_data(
        &self,
        _reference: &str,
        _gateway_data: Value,
    ) -> Result<Payment, AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn record_vote_cast(&self, _reference: &str) -> Result<Payment, AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn record_vote_cast_error(
        &self,
        _reference: &str,
        _error: &str,
    ) -> Result<(), AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn count_recent_by_ip(
        &self,
        _voter_ip: &str,
        _window: chrono::Duration,
    ) -> Result<i64, AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }

    async fn sweep_expired(&self) -> Result<u64, AppError> {
        Err(AppError::Database(sqlx::Error::PoolClosed))
    }
}

/// In-memory bundle/coupon catalog.
pub struct InMemoryCatalog {
    bundles: Mutex<HashMap<Uuid, VoteBundle>>,
    coupons: Mutex<HashMap<String, Coupon>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            bundles: Mutex::new(HashMap::new()),
            coupons: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_bundle(
        &self,
        name: &str,
        price_cents: i64,
        votes: i32,
        events: &[Uuid],
        categories: &[Uuid],
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.bundles.lock().unwrap().insert(
            id,
            VoteBundle {
                id,
                name: name.to_string(),
                price_cents,
                votes,
                is_active: true,
                applicable_event_ids: events.to_vec(),
                applicable_category_ids: categories.to_vec(),
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn deactivate_bundle(&self, id: Uuid) {
        if let Some(bundle) = self.bundles.lock().unwrap().get_mut(&id) {
            bundle.is_active = false;
        }
    }

    pub fn set_bundle_price(&self, id: Uuid, price_cents: i64) {
        if let Some(bundle) = self.bundles.lock().unwrap().get_mut(&id) {
            bundle.price_cents = price_cents;
        }
    }

    pub fn add_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: i64,
        events: &[Uuid],
        categories: &[Uuid],
    ) {
        self.coupons.lock().unwrap().insert(
            code.to_uppercase(),
            Coupon {
                id: Uuid::new_v4(),
                code: code.to_string(),
                discount_type,
                value,
                applicable_event_ids: events.to_vec(),
                applicable_category_ids: categories.to_vec(),
                expires_at: None,
                is_active: true,
                max_uses: None,
                times_used: 0,
                created_at: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn bundle(&self, id: Uuid) -> Result<Option<VoteBundle>, AppError> {
        Ok(self.bundles.lock().unwrap().get(&id).cloned())
    }

    async fn coupon(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        Ok(self
            .coupons
            .lock()
            .unwrap()
            .get(&code.trim().to_uppercase())
            .cloned())
    }
}

/// Scriptable gateway double. Signature verification uses the real HMAC
/// check with the fake's secret.
pub struct FakeGateway {
    secret: String,
    initialize_fails: AtomicBool,
    initialize_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    verify_result: Mutex<Option<GatewayVerifyResult>>,
}

impl FakeGateway {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
            initialize_fails: AtomicBool::new(false),
            initialize_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            verify_result: Mutex::new(None),
        }
    }

    pub fn fail_initialize(&self, fail: bool) {
        self.initialize_fails.store(fail, Ordering::SeqCst);
    }

    pub fn set_verify_result(&self, result: GatewayVerifyResult) {
        *self.verify_result.lock().unwrap() = Some(result);
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize(
        &self,
        _email: &str,
        _amount_cents: i64,
        reference: &str,
        _callback_url: &str,
        _metadata: Value,
    ) -> Result<GatewayInitResult, AppError> {
        if self.initialize_fails.load(Ordering::SeqCst) {
            return Err(AppError::Gateway("gateway unavailable".to_string()));
        }
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayInitResult {
            authorization_url: format!("https://checkout.test/{reference}"),
            access_code: format!("ac_{reference}"),
        })
    }

    async fn verify(&self, _reference: &str) -> Result<GatewayVerifyResult, AppError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verify_result
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::Gateway("gateway unreachable".to_string()))
    }

    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        signature_matches(&self.secret, raw_body, signature)
    }
}

/// Vote caster that records every invocation.
pub struct CountingCaster {
    casts: Mutex<Vec<CastVotes>>,
    fail_message: Mutex<Option<String>>,
}

impl CountingCaster {
    pub fn new() -> Self {
        Self {
            casts: Mutex::new(Vec::new()),
            fail_message: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail_message.lock().unwrap() = Some(message.to_string());
    }

    pub fn casts(&self) -> Vec<CastVotes> {
        self.casts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoteCaster for CountingCaster {
    async fn cast(&self, request: CastVotes) -> Result<(), AppError> {
        self.casts.lock().unwrap().push(request);
        if let Some(message) = self.fail_message.lock().unwrap().clone() {
            return Err(AppError::Validation(message));
        }
        Ok(())
    }
}
