//! Payment record store - the authoritative payment state machine.
//!
//! This service owns every mutation of the `payments` table. The critical
//! operation is `update_status`: a single conditional UPDATE (compare-and-
//! swap on the status column) that only applies while the stored status is
//! still `pending`. That one statement is the sole serialization point
//! between the webhook path and the polling path; a read-then-write pair
//! would open a window where both paths observe `pending` and both cast
//! votes.

use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::payment::{NewPayment, Payment, PaymentStatus};

/// Result of a conditional status update.
///
/// `transitioned` is true only for the call that actually moved the payment
/// out of `pending`. Duplicate confirmations observe `false` together with
/// the already-terminal record - the "already processed" signal, which is
/// not an error.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub payment: Payment,
    pub transitioned: bool,
}

/// Persistence seam for payments.
///
/// Injected into the pipeline and reconciler so tests can substitute an
/// in-memory implementation with the same compare-and-swap semantics.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment in `pending`.
    ///
    /// Fails with `DuplicatePending` (carrying the existing reference) if an
    /// un-expired pending payment already exists for the same
    /// (voter email, event, category) triple.
    async fn create(&self, new_payment: NewPayment) -> Result<Payment, AppError>;

    /// Fetch a payment by reference.
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>, AppError>;

    /// Find an un-expired pending payment for the voter/event/category
    /// triple, if one exists. Expired pendings are excluded and never
    /// reused.
    async fn find_reusable_pending(
        &self,
        voter_email: &str,
        event_id: Uuid,
        category_id: Uuid,
    ) -> Result<Option<Payment>, AppError>;

    /// Conditionally transition a payment out of `pending`, appending
    /// gateway metadata in the same statement.
    ///
    /// If the payment is already terminal the stored record is returned
    /// unchanged with `transitioned = false`.
    async fn update_status(
        &self,
        reference: &str,
        new_status: PaymentStatus,
        gateway_data: Value,
    ) -> Result<StatusTransition, AppError>;

    /// Append gateway metadata (e.g. the checkout redirect captured at
    /// initialization) without touching the status.
    async fn attach_gateway_data(
        &self,
        reference: &str,
        gateway_data: Value,
    ) -> Result<Payment, AppError>;

    /// Mark the purchased votes as cast: zeroes `votes_remaining` and
    /// stamps `metadata.votes_cast_at`.
    async fn record_vote_cast(&self, reference: &str) -> Result<Payment, AppError>;

    /// Record a vote-casting failure in `metadata.vote_cast_error` without
    /// reverting the payment's status. Money was captured; the record must
    /// stay reviewable.
    async fn record_vote_cast_error(&self, reference: &str, error: &str)
    -> Result<(), AppError>;

    /// Count payments initiated from one IP inside a trailing window.
    async fn count_recent_by_ip(
        &self,
        voter_ip: &str,
        window: chrono::Duration,
    ) -> Result<i64, AppError>;

    /// Stamp `metadata.expired_at` on pending payments older than the TTL.
    /// Rows are never deleted; the stamp is for operators, exclusion from
    /// reuse is driven by `created_at` alone.
    async fn sweep_expired(&self) -> Result<u64, AppError>;
}

/// PostgreSQL-backed payment store.
pub struct PgPaymentStore {
    pool: DbPool,
    pending_ttl: chrono::Duration,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool, pending_ttl: chrono::Duration) -> Self {
        Self { pool, pending_ttl }
    }

    fn ttl_minutes(&self) -> i32 {
        self.pending_ttl.num_minutes() as i32
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn create(&self, new_payment: NewPayment) -> Result<Payment, AppError> {
        // Duplicate-pending guard, scoped to un-expired records
        if let Some(existing) = self
            .find_reusable_pending(
                &new_payment.voter_email,
                new_payment.event_id,
                new_payment.category_id,
            )
            .await?
        {
            return Err(AppError::DuplicatePending(existing.reference));
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                reference,
                voter_email,
                voter_ip,
                user_agent,
                event_id,
                category_id,
                candidate_id,
                vote_bundles,
                coupon_code,
                original_amount_cents,
                discount_amount_cents,
                final_amount_cents,
                votes_remaining,
                metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(&new_payment.reference)
        .bind(&new_payment.voter_email)
        .bind(&new_payment.voter_ip)
        .bind(&new_payment.user_agent)
        .bind(new_payment.event_id)
        .bind(new_payment.category_id)
        .bind(new_payment.candidate_id)
        .bind(Json(&new_payment.lines))
        .bind(&new_payment.coupon_code)
        .bind(new_payment.original_amount_cents)
        .bind(new_payment.discount_amount_cents)
        .bind(new_payment.final_amount_cents)
        .bind(new_payment.votes_remaining)
        .bind(json!({ "fraud_check": &new_payment.fraud_check }))
        .fetch_one(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    async fn find_reusable_pending(
        &self,
        voter_email: &str,
        event_id: Uuid,
        category_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE voter_email = $1
              AND event_id = $2
              AND category_id = $3
              AND status = 'pending'
              AND created_at > NOW() - make_interval(mins => $4)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(voter_email)
        .bind(event_id)
        .bind(category_id)
        .bind(self.ttl_minutes())
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn update_status(
        &self,
        reference: &str,
        new_status: PaymentStatus,
        gateway_data: Value,
    ) -> Result<StatusTransition, AppError> {
        // Single-statement compare-and-swap: the WHERE clause only matches
        // while the row is still pending, so exactly one caller can win.
        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $2,
                gateway_data = gateway_data || $3,
                updated_at = NOW()
            WHERE reference = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(new_status)
        .bind(&gateway_data)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(payment) = updated {
            return Ok(StatusTransition {
                payment,
                transitioned: true,
            });
        }

        // Lost the race or the payment was already terminal: hand back the
        // stored record untouched.
        let existing = self
            .find_by_reference(reference)
            .await?
            .ok_or(AppError::PaymentNotFound)?;

        Ok(StatusTransition {
            payment: existing,
            transitioned: false,
        })
    }

    async fn attach_gateway_data(
        &self,
        reference: &str,
        gateway_data: Value,
    ) -> Result<Payment, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET gateway_data = gateway_data || $2,
                updated_at = NOW()
            WHERE reference = $1
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(&gateway_data)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

        Ok(payment)
    }

    async fn record_vote_cast(&self, reference: &str) -> Result<Payment, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET votes_remaining = 0,
                metadata = metadata || jsonb_build_object('votes_cast_at', NOW()::text),
                updated_at = NOW()
            WHERE reference = $1
            RETURNING *
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

        Ok(payment)
    }

    async fn record_vote_cast_error(
        &self,
        reference: &str,
        error: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET metadata = metadata || jsonb_build_object('vote_cast_error', $2::text),
                updated_at = NOW()
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_recent_by_ip(
        &self,
        voter_ip: &str,
        window: chrono::Duration,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM payments
            WHERE voter_ip = $1
              AND created_at > NOW() - make_interval(mins => $2)
            "#,
        )
        .bind(voter_ip)
        .bind(window.num_minutes() as i32)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn sweep_expired(&self) -> Result<u64, AppError> {
        let stamped = sqlx::query(
            r#"
            UPDATE payments
            SET metadata = metadata || jsonb_build_object('expired_at', NOW()::text),
                updated_at = NOW()
            WHERE status = 'pending'
              AND created_at < NOW() - make_interval(mins => $1)
              AND NOT (metadata ? 'expired_at')
            "#,
        )
        .bind(self.ttl_minutes())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(stamped)
    }
}
