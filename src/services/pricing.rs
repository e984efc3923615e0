//! Bundle pricing calculator.
//!
//! Resolves a requested set of (bundle, quantity) pairs into a validated
//! total price and vote count for a given event/category. Prices and vote
//! counts are copied into the resulting breakdown at this moment and never
//! re-read, so later catalog changes cannot affect an in-flight payment.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::payment::{BundleSelection, PricedLine};
use crate::services::catalog::Catalog;

/// A fully validated, priced order.
#[derive(Debug, Clone)]
pub struct PricedOrder {
    /// Per-bundle breakdown with unit prices and votes locked in
    pub lines: Vec<PricedLine>,

    /// Sum of price × quantity across all lines, in cents
    pub total_price_cents: i64,

    /// Sum of votes × quantity across all lines
    pub total_votes: i32,
}

/// Price a set of bundle selections for an event/category.
///
/// # Errors
///
/// Returns `Validation` if the selection list is empty, a quantity is not
/// positive, a bundle is missing or inactive, or a bundle's applicability
/// lists exclude the request's event or category. No side effects occur on
/// failure; nothing has been persisted yet.
pub async fn price_order(
    catalog: &dyn Catalog,
    selections: &[BundleSelection],
    event_id: Uuid,
    category_id: Uuid,
) -> Result<PricedOrder, AppError> {
    if selections.is_empty() {
        return Err(AppError::Validation(
            "at least one vote bundle is required".to_string(),
        ));
    }

    let mut lines = Vec::with_capacity(selections.len());
    let mut total_price_cents: i64 = 0;
    let mut total_votes: i32 = 0;

    for selection in selections {
        if selection.quantity <= 0 {
            return Err(AppError::Validation(format!(
                "bundle {}: quantity must be positive",
                selection.bundle_id
            )));
        }

        let bundle = catalog
            .bundle(selection.bundle_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("bundle {} not found", selection.bundle_id))
            })?;

        bundle
            .usable_for(event_id, category_id)
            .map_err(|reason| AppError::Validation(format!("bundle {}: {reason}", bundle.name)))?;

        let line_price_cents = bundle.price_cents * selection.quantity as i64;
        let line_votes = bundle.votes * selection.quantity;

        total_price_cents += line_price_cents;
        total_votes += line_votes;

        lines.push(PricedLine {
            bundle_id: bundle.id,
            name: bundle.name,
            quantity: selection.quantity,
            unit_price_cents: bundle.price_cents,
            votes_per_unit: bundle.votes,
            line_price_cents,
            line_votes,
        });
    }

    Ok(PricedOrder {
        lines,
        total_price_cents,
        total_votes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::InMemoryCatalog;

    fn selection(bundle_id: Uuid, quantity: i32) -> BundleSelection {
        BundleSelection {
            bundle_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn prices_and_votes_are_summed_across_lines() {
        let catalog = InMemoryCatalog::new();
        let small = catalog.add_bundle("Small", 5_000, 5, &[], &[]);
        let large = catalog.add_bundle("Large", 20_000, 25, &[], &[]);

        let order = price_order(
            &catalog,
            &[selection(small, 2), selection(large, 1)],
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        assert_eq!(order.total_price_cents, 30_000);
        assert_eq!(order.total_votes, 35);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[0].line_price_cents, 10_000);
        assert_eq!(order.lines[0].line_votes, 10);
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let catalog = InMemoryCatalog::new();
        let err = price_order(&catalog, &[], Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let catalog = InMemoryCatalog::new();
        let bundle = catalog.add_bundle("Small", 5_000, 5, &[], &[]);
        let err = price_order(
            &catalog,
            &[selection(bundle, 0)],
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_bundle_is_rejected() {
        let catalog = InMemoryCatalog::new();
        let err = price_order(
            &catalog,
            &[selection(Uuid::new_v4(), 1)],
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn inactive_bundle_is_rejected() {
        let catalog = InMemoryCatalog::new();
        let bundle = catalog.add_bundle("Retired", 5_000, 5, &[], &[]);
        catalog.deactivate_bundle(bundle);

        let err = price_order(
            &catalog,
            &[selection(bundle, 1)],
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn bundle_restricted_to_another_event_is_rejected() {
        let catalog = InMemoryCatalog::new();
        let event_x = Uuid::new_v4();
        let event_y = Uuid::new_v4();
        let bundle = catalog.add_bundle("EventX only", 5_000, 5, &[event_x], &[]);

        let err = price_order(
            &catalog,
            &[selection(bundle, 1)],
            event_y,
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // same bundle prices fine for its own event
        assert!(
            price_order(&catalog, &[selection(bundle, 1)], event_x, Uuid::new_v4())
                .await
                .is_ok()
        );
    }
}
