//! Coupon discount engine.
//!
//! Applies coupon codes sequentially against a running balance, in the
//! exact order the caller supplied them. Each valid coupon reduces the
//! balance; invalid, expired, inapplicable, or exhausted codes are skipped
//! with a log line rather than failing the whole request.
//!
//! Re-running the same ordered code list against the same balance always
//! yields the same final amount and the same applied set. Order matters:
//! a percent coupon applied after a fixed one sees a smaller balance.

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::catalog::Catalog;

/// One coupon that actually reduced the balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    pub code: String,
    pub amount_cents: i64,
}

/// Outcome of running the engine over a code list.
#[derive(Debug, Clone)]
pub struct DiscountOutcome {
    /// Balance after all applied discounts, floored at zero
    pub final_amount_cents: i64,

    /// Total discount taken off the original balance
    pub discount_amount_cents: i64,

    /// Successfully applied coupons, in application order
    pub applied: Vec<AppliedCoupon>,
}

/// Apply coupon codes, in caller order, against `total_price_cents`.
///
/// # Skip Rules
///
/// A code is skipped (never an error) when it is blank, unknown, inactive,
/// expired, over its usage limit, inapplicable to the event/category, or
/// yields a zero discount because the balance is already exhausted.
///
/// # Errors
///
/// Only infrastructure failures (catalog lookups) propagate; coupon
/// validity never aborts the batch.
pub async fn apply_coupons(
    catalog: &dyn Catalog,
    codes: &[String],
    total_price_cents: i64,
    event_id: Uuid,
    category_id: Uuid,
) -> Result<DiscountOutcome, AppError> {
    let now = Utc::now();
    let mut balance_cents = total_price_cents;
    let mut applied = Vec::new();

    for raw_code in codes {
        let code = raw_code.trim();
        if code.is_empty() {
            continue;
        }

        let Some(coupon) = catalog.coupon(code).await? else {
            tracing::debug!(code, "skipping unknown coupon");
            continue;
        };

        if let Err(reason) = coupon.usable_for(event_id, category_id, now) {
            tracing::debug!(code, reason, "skipping coupon");
            continue;
        }

        let discount_cents = coupon.discount_for(balance_cents);
        if discount_cents == 0 {
            tracing::debug!(code, "skipping coupon: balance already exhausted");
            continue;
        }

        balance_cents -= discount_cents;
        applied.push(AppliedCoupon {
            code: coupon.code,
            amount_cents: discount_cents,
        });
    }

    Ok(DiscountOutcome {
        final_amount_cents: balance_cents,
        discount_amount_cents: total_price_cents - balance_cents,
        applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::coupon::DiscountType;
    use crate::services::fakes::InMemoryCatalog;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn percent_coupon_reduces_balance() {
        let catalog = InMemoryCatalog::new();
        let event = Uuid::new_v4();
        catalog.add_coupon("TWENTY", DiscountType::Percent, 20, &[event], &[]);

        let outcome = apply_coupons(&catalog, &codes(&["TWENTY"]), 10_000, event, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(outcome.discount_amount_cents, 2_000);
        assert_eq!(outcome.final_amount_cents, 8_000);
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.applied[0].code, "TWENTY");
    }

    #[tokio::test]
    async fn invalid_codes_are_skipped_not_fatal() {
        let catalog = InMemoryCatalog::new();
        catalog.add_coupon("REAL", DiscountType::Fixed, 1_000, &[], &[]);

        let outcome = apply_coupons(
            &catalog,
            &codes(&["NOSUCH", "REAL", ""]),
            5_000,
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_amount_cents, 4_000);
        assert_eq!(outcome.applied.len(), 1);
    }

    #[tokio::test]
    async fn application_order_changes_the_result_but_reruns_do_not() {
        let catalog = InMemoryCatalog::new();
        catalog.add_coupon("HALF", DiscountType::Percent, 50, &[], &[]);
        catalog.add_coupon("OFF30", DiscountType::Fixed, 3_000, &[], &[]);

        // 50% of 10000 = 5000, then 3000 off -> 2000
        let half_first = apply_coupons(
            &catalog,
            &codes(&["HALF", "OFF30"]),
            10_000,
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        assert_eq!(half_first.final_amount_cents, 2_000);

        // 3000 off 10000 = 7000, then 50% -> 3500
        let fixed_first = apply_coupons(
            &catalog,
            &codes(&["OFF30", "HALF"]),
            10_000,
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        assert_eq!(fixed_first.final_amount_cents, 3_500);

        // re-running an identical input reproduces the identical outcome
        let rerun = apply_coupons(
            &catalog,
            &codes(&["HALF", "OFF30"]),
            10_000,
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        assert_eq!(rerun.final_amount_cents, half_first.final_amount_cents);
        assert_eq!(rerun.applied, half_first.applied);
    }

    #[tokio::test]
    async fn balance_never_goes_negative() {
        let catalog = InMemoryCatalog::new();
        catalog.add_coupon("BIG", DiscountType::Fixed, 50_000, &[], &[]);
        catalog.add_coupon("MORE", DiscountType::Fixed, 1_000, &[], &[]);

        let outcome = apply_coupons(
            &catalog,
            &codes(&["BIG", "MORE"]),
            10_000,
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_amount_cents, 0);
        assert_eq!(outcome.discount_amount_cents, 10_000);
        // the second coupon found nothing left to discount
        assert_eq!(outcome.applied.len(), 1);
    }

    #[tokio::test]
    async fn coupon_for_another_event_is_skipped() {
        let catalog = InMemoryCatalog::new();
        let event_a = Uuid::new_v4();
        let event_b = Uuid::new_v4();
        catalog.add_coupon("EVENTA", DiscountType::Percent, 20, &[event_a], &[]);

        let outcome = apply_coupons(
            &catalog,
            &codes(&["EVENTA"]),
            10_000,
            event_b,
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_amount_cents, 10_000);
        assert!(outcome.applied.is_empty());
    }
}
