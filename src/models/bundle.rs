//! Vote bundle data model.
//!
//! Bundles are purchasable packages granting a fixed number of votes for a
//! fixed price. This service only reads them; administration lives elsewhere.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a vote bundle record from the database.
///
/// # Database Table
///
/// Maps to the `vote_bundles` table. Each bundle:
/// - Grants `votes` votes per unit purchased at `price_cents` each
/// - Stores price in cents (never floats!)
/// - May be restricted to specific events and/or categories
///
/// # Applicability
///
/// An empty `applicable_event_ids` array means the bundle is valid for every
/// event; likewise for categories. A non-empty array is an allow-list.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct VoteBundle {
    /// Unique identifier for this bundle
    pub id: Uuid,

    /// Human-readable name (e.g. "Starter Pack")
    pub name: String,

    /// Unit price in cents
    pub price_cents: i64,

    /// Votes granted per unit purchased
    pub votes: i32,

    /// Inactive bundles cannot be purchased
    pub is_active: bool,

    /// Allow-list of event ids (empty = all events)
    pub applicable_event_ids: Vec<Uuid>,

    /// Allow-list of category ids (empty = all categories)
    pub applicable_category_ids: Vec<Uuid>,

    /// When the bundle was created
    pub created_at: DateTime<Utc>,
}

impl VoteBundle {
    /// Check whether this bundle can be purchased for the given event and
    /// category. Returns the rejection reason on failure so callers can
    /// build a precise validation message.
    pub fn usable_for(&self, event_id: Uuid, category_id: Uuid) -> Result<(), &'static str> {
        if !self.is_active {
            return Err("bundle is not active");
        }
        if !self.applicable_event_ids.is_empty() && !self.applicable_event_ids.contains(&event_id) {
            return Err("bundle is not available for this event");
        }
        if !self.applicable_category_ids.is_empty()
            && !self.applicable_category_ids.contains(&category_id)
        {
            return Err("bundle is not available for this category");
        }
        Ok(())
    }
}
