//! Payment data models and API request/response types.
//!
//! This module defines:
//! - `Payment`: Database entity, the financial audit ledger of a vote purchase
//! - `PaymentStatus`: The pending → success | failed state machine
//! - Request types for the initialize operation
//! - `PaymentResponse`: Projection returned to clients
//!
//! # Lifecycle
//!
//! A payment is created in `pending` by the initialization pipeline and
//! mutated at most twice afterwards: one status transition (to a terminal
//! state) and one vote-cast outcome annotation. Rows are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

/// Payment state machine.
///
/// Transitions are monotonic: once a payment reaches `Success` or `Failed`
/// no further transition is permitted; a second attempt is a no-op that
/// returns the existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }
}

/// One priced bundle line, locked in when the payment is created.
///
/// The unit price and votes are copied out of the bundle at pricing time so
/// a later price change to the bundle cannot retroactively alter an
/// in-flight payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub bundle_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub votes_per_unit: i32,
    pub line_price_cents: i64,
    pub line_votes: i32,
}

/// Advisory fraud verdict recorded on the payment at creation time.
///
/// Never blocks initialization; `passed = false` marks the payment for
/// later human review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudVerdict {
    pub passed: bool,
    pub reasons: Vec<String>,
}

impl FraudVerdict {
    /// The neutral verdict: no signals, nothing to review.
    pub fn clean() -> Self {
        Self {
            passed: true,
            reasons: vec![],
        }
    }
}

/// Represents a payment record from the database.
///
/// # Database Table
///
/// Maps to the `payments` table. Each payment:
/// - Is identified by an opaque unique `reference` (the idempotency key)
/// - Stores all amounts in cents (never floats!)
/// - Pins the priced bundle breakdown in `vote_bundles` at creation
/// - Accumulates gateway metadata in `gateway_data` (append-only)
///
/// # Amount Invariant
///
/// `final_amount_cents = original_amount_cents - discount_amount_cents`,
/// and `final_amount_cents >= 0`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Payment {
    /// Unique identifier for this payment
    pub id: Uuid,

    /// Opaque reference correlating this row with the gateway charge
    ///
    /// Generated once at creation, immutable, and used as the idempotency
    /// key for every subsequent operation.
    pub reference: String,

    /// Current state machine position
    pub status: PaymentStatus,

    /// Voter email, lower-cased and trimmed at intake
    pub voter_email: String,

    /// Client IP the purchase was initiated from
    pub voter_ip: String,

    /// Client user agent, when provided
    pub user_agent: Option<String>,

    /// Event being voted in (immutable after creation)
    pub event_id: Uuid,

    /// Category being voted in (immutable after creation)
    pub category_id: Uuid,

    /// Candidate receiving the votes (immutable after creation)
    pub candidate_id: Uuid,

    /// Priced bundle breakdown pinned at creation
    pub vote_bundles: Json<Vec<PricedLine>>,

    /// First successfully applied coupon code, for audit
    pub coupon_code: Option<String>,

    /// Price before discounts, in cents
    pub original_amount_cents: i64,

    /// Total discount applied, in cents
    pub discount_amount_cents: i64,

    /// Amount actually charged, in cents
    pub final_amount_cents: i64,

    /// Votes this payment is still entitled to cast
    ///
    /// Zeroed once casting completes.
    pub votes_remaining: i32,

    /// Opaque gateway metadata (authorization url, transaction id, channel,
    /// fees, webhook-verified flag). Append-only, never removed.
    pub gateway_data: Value,

    /// Service-side annotations: `fraud_check` at creation,
    /// `vote_cast_error` / `expired_at` appended later.
    pub metadata: Value,

    /// When the payment was created
    pub created_at: DateTime<Utc>,

    /// When the payment was last updated
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Whether this payment has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The gateway checkout redirect captured at initialization, if the
    /// initialize call ever completed.
    pub fn authorization_url(&self) -> Option<&str> {
        self.gateway_data.get("authorization_url").and_then(Value::as_str)
    }

    /// The gateway access code paired with the checkout redirect.
    pub fn access_code(&self) -> Option<&str> {
        self.gateway_data.get("access_code").and_then(Value::as_str)
    }
}

/// Everything needed to insert a new pending payment.
///
/// Assembled by the initialization pipeline after pricing, discounting, and
/// fraud screening have all resolved; by the time this struct exists no
/// validation can fail, so creation never leaves partial state.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub reference: String,
    pub voter_email: String,
    pub voter_ip: String,
    pub user_agent: Option<String>,
    pub event_id: Uuid,
    pub category_id: Uuid,
    pub candidate_id: Uuid,
    pub lines: Vec<PricedLine>,
    pub coupon_code: Option<String>,
    pub original_amount_cents: i64,
    pub discount_amount_cents: i64,
    pub final_amount_cents: i64,
    pub votes_remaining: i32,
    pub fraud_check: FraudVerdict,
}

/// One requested (bundle, quantity) pair in an initialize request.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleSelection {
    pub bundle_id: Uuid,
    pub quantity: i32,
}

/// Request to initialize a vote purchase.
///
/// # JSON Example
///
/// ```json
/// {
///   "email": "voter@example.com",
///   "bundles": [{"bundle_id": "550e8400-e29b-41d4-a716-446655440000", "quantity": 2}],
///   "coupons": ["EARLYBIRD"],
///   "event_id": "660e8400-e29b-41d4-a716-446655440001",
///   "category_id": "770e8400-e29b-41d4-a716-446655440002",
///   "candidate_id": "880e8400-e29b-41d4-a716-446655440003",
///   "callback_url": "https://vote.example.com/thanks"
/// }
/// ```
///
/// # Validation
///
/// - `email`: required, must contain "@"; normalized to lower case
/// - `bundles`: required, non-empty, every quantity > 0
/// - `coupons`: optional, applied in the order given
/// - `callback_url`: required, must be a valid http(s) URL
#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub email: String,

    pub bundles: Vec<BundleSelection>,

    #[serde(default)]
    pub coupons: Vec<String>,

    pub event_id: Uuid,
    pub category_id: Uuid,
    pub candidate_id: Uuid,

    pub callback_url: String,
}

/// Response for a successful initialization.
///
/// # JSON Example
///
/// ```json
/// {
///   "reference": "vp_3f9c2a...",
///   "authorization_url": "https://checkout.paystack.com/abc123",
///   "access_code": "abc123"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct InitializeResponse {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
}

/// Projection of a payment returned to clients.
///
/// Safe to request repeatedly; "still pending" is a normal answer, not an
/// error.
///
/// # JSON Example
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
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub reference: String,
    pub status: PaymentStatus,
    pub original_amount_cents: i64,
    pub discount_amount_cents: i64,
    pub final_amount_cents: i64,
    pub votes_remaining: i32,
    pub created_at: DateTime<Utc>,
}

/// Convert database Payment to API PaymentResponse.
///
/// This removes internal fields like gateway metadata and the fraud verdict
/// that clients don't need to see.
impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            reference: payment.reference,
            status: payment.status,
            original_amount_cents: payment.original_amount_cents,
            discount_amount_cents: payment.discount_amount_cents,
            final_amount_cents: payment.final_amount_cents,
            votes_remaining: payment.votes_remaining,
            created_at: payment.created_at,
        }
    }
}
