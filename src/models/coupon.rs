//! Coupon data model and discount arithmetic.
//!
//! Coupons reduce a payment's balance. This service reads them and computes
//! discounts; issuing codes and maintaining usage counters is owned by the
//! admin side.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "discount_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `value` is percent points (1-100) of the running balance
    Percent,
    /// `value` is a flat amount in cents
    Fixed,
}

/// Represents a coupon record from the database.
///
/// # Database Table
///
/// Maps to the `coupons` table. Each coupon:
/// - Has a unique code entered by the voter
/// - Discounts either a percentage of the running balance or a flat amount
/// - May be restricted to events/categories, time-limited, or use-limited
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Coupon {
    /// Unique identifier for this coupon
    pub id: Uuid,

    /// The code voters type in (unique)
    pub code: String,

    /// Percent-of-balance or fixed amount
    pub discount_type: DiscountType,

    /// Percent points for `percent`, cents for `fixed`
    pub value: i64,

    /// Allow-list of event ids (empty = all events)
    pub applicable_event_ids: Vec<Uuid>,

    /// Allow-list of category ids (empty = all categories)
    pub applicable_category_ids: Vec<Uuid>,

    /// Optional expiry; a coupon at or past this instant is unusable
    pub expires_at: Option<DateTime<Utc>>,

    /// Inactive coupons are skipped
    pub is_active: bool,

    /// Optional cap on total redemptions
    pub max_uses: Option<i32>,

    /// Redemptions so far (maintained by the issuing side)
    pub times_used: i32,

    /// When the coupon was created
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Check whether this coupon may be applied to a purchase for the given
    /// event and category at instant `now`. Returns the rejection reason on
    /// failure; the discount engine logs it and moves on to the next code.
    pub fn usable_for(
        &self,
        event_id: Uuid,
        category_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), &'static str> {
        if !self.is_active {
            return Err("coupon is not active");
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err("coupon has expired");
            }
        }
        if let Some(max_uses) = self.max_uses {
            if self.times_used >= max_uses {
                return Err("coupon usage limit reached");
            }
        }
        if !self.applicable_event_ids.is_empty() && !self.applicable_event_ids.contains(&event_id) {
            return Err("coupon is not valid for this event");
        }
        if !self.applicable_category_ids.is_empty()
            && !self.applicable_category_ids.contains(&category_id)
        {
            return Err("coupon is not valid for this category");
        }
        Ok(())
    }

    /// Compute the discount this coupon yields against a running balance.
    ///
    /// The result is always within `0..=balance_cents`: a percent coupon
    /// uses integer arithmetic (floor), a fixed coupon is clamped so it can
    /// never push the balance negative.
    pub fn discount_for(&self, balance_cents: i64) -> i64 {
        let raw = match self.discount_type {
            DiscountType::Percent => balance_cents * self.value / 100,
            DiscountType::Fixed => self.value,
        };
        raw.clamp(0, balance_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            discount_type,
            value,
            applicable_event_ids: vec![],
            applicable_category_ids: vec![],
            expires_at: None,
            is_active: true,
            max_uses: None,
            times_used: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn percent_discount_floors_integer_math() {
        let c = coupon(DiscountType::Percent, 20);
        assert_eq!(c.discount_for(10_000), 2_000);
        // 20% of 99 cents floors to 19
        assert_eq!(c.discount_for(99), 19);
    }

    #[test]
    fn fixed_discount_never_exceeds_balance() {
        let c = coupon(DiscountType::Fixed, 5_000);
        assert_eq!(c.discount_for(10_000), 5_000);
        assert_eq!(c.discount_for(3_000), 3_000);
        assert_eq!(c.discount_for(0), 0);
    }

    #[test]
    fn expired_coupon_is_rejected() {
        let mut c = coupon(DiscountType::Percent, 10);
        c.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        let err = c
            .usable_for(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .unwrap_err();
        assert_eq!(err, "coupon has expired");
    }

    #[test]
    fn usage_limit_is_enforced() {
        let mut c = coupon(DiscountType::Percent, 10);
        c.max_uses = Some(3);
        c.times_used = 3;
        assert!(c.usable_for(Uuid::new_v4(), Uuid::new_v4(), Utc::now()).is_err());
    }

    #[test]
    fn event_allow_list_excludes_other_events() {
        let event = Uuid::new_v4();
        let category = Uuid::new_v4();
        let mut c = coupon(DiscountType::Percent, 10);
        c.applicable_event_ids = vec![event];
        assert!(c.usable_for(event, category, Utc::now()).is_ok());
        assert!(c.usable_for(Uuid::new_v4(), category, Utc::now()).is_err());
    }
}
