//! Data models representing database entities and API payloads.
//!
//! This module contains all data structures that map to database tables
//! plus the typed payloads exchanged with the payment gateway.

/// Read-only vote bundle catalog model
pub mod bundle;
/// Read-only coupon model and discount arithmetic
pub mod coupon;
/// Typed gateway call results and webhook events
pub mod gateway;
/// Payment ledger entity and API request/response types
pub mod payment;
