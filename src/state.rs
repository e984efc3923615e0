//! Shared application state.
//!
//! All collaborators are constructed once at startup and injected into the
//! router; handlers extract this state instead of reaching for globals, so
//! tests can wire the same services against fakes.

use std::sync::Arc;

use crate::db::DbPool;
use crate::services::payments::PaymentService;
use crate::services::reconciler::Reconciler;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, used directly only by the health check
    pub db: DbPool,

    /// The initialize pipeline
    pub payments: Arc<PaymentService>,

    /// The webhook/polling confirmation protocol
    pub reconciler: Arc<Reconciler>,
}
