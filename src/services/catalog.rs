//! Read-only access to the bundle and coupon catalog.
//!
//! The pipeline never writes to either table; bundles and coupons are
//! administered elsewhere and their effects are pinned into the payment at
//! creation time.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::bundle::VoteBundle;
use crate::models::coupon::Coupon;

/// Lookup seam for bundles and coupons.
///
/// Injected into the pricing calculator and discount engine so tests can
/// substitute an in-memory catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch a bundle by id, or `None` if it does not exist.
    async fn bundle(&self, id: Uuid) -> Result<Option<VoteBundle>, AppError>;

    /// Fetch a coupon by code (case-insensitive), or `None` if unknown.
    async fn coupon(&self, code: &str) -> Result<Option<Coupon>, AppError>;
}

/// PostgreSQL-backed catalog.
pub struct PgCatalog {
    pool: DbPool,
}

impl PgCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn bundle(&self, id: Uuid) -> Result<Option<VoteBundle>, AppError> {
        let bundle = sqlx::query_as::<_, VoteBundle>("SELECT * FROM vote_bundles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(bundle)
    }

    async fn coupon(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        let coupon =
            sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE UPPER(code) = UPPER($1)")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        Ok(coupon)
    }
}
