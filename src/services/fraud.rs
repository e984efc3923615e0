//! Advisory fraud heuristic.
//!
//! Fast, best-effort checks run before a payment is created: IP velocity
//! over a trailing window and structurally suspicious email addresses. The
//! verdict is recorded on the payment for later review and never blocks
//! initialization; any internal failure degrades to a clean verdict.

use crate::models::payment::FraudVerdict;
use crate::services::store::PaymentStore;

/// Tuning knobs for the heuristic, sourced from configuration.
#[derive(Debug, Clone)]
pub struct FraudSettings {
    /// Trailing window for the IP velocity check
    pub ip_window: chrono::Duration,

    /// Payments from one IP inside the window before a request is flagged
    pub ip_threshold: i64,
}

/// Screen a payment request.
///
/// This function must never fail: a store error is logged and treated as a
/// clean verdict so an infrastructure hiccup cannot block a legitimate
/// purchase.
pub async fn screen(
    store: &dyn PaymentStore,
    email: &str,
    voter_ip: &str,
    settings: &FraudSettings,
) -> FraudVerdict {
    let mut reasons = Vec::new();

    match store.count_recent_by_ip(voter_ip, settings.ip_window).await {
        Ok(count) if count >= settings.ip_threshold => {
            reasons.push(format!(
                "{count} payments from {voter_ip} in the last {} minutes",
                settings.ip_window.num_minutes()
            ));
        }
        Ok(_) => {}
        Err(error) => {
            tracing::warn!(%error, "fraud velocity check failed; treating as clean");
            return FraudVerdict::clean();
        }
    }

    if has_suspicious_subaddressing(email) {
        reasons.push(format!("email {email} uses repeated sub-address separators"));
    }

    FraudVerdict {
        passed: reasons.is_empty(),
        reasons,
    }
}

/// Throwaway-address pattern: two or more "+" separators in the local part
/// (e.g. `name+a+b@mail.test`), common when one inbox fans out into many
/// voter identities.
fn has_suspicious_subaddressing(email: &str) -> bool {
    email
        .split('@')
        .next()
        .map(|local| local.matches('+').count() >= 2)
        .unwrap_or(false)
}
