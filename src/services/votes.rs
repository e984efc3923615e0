//! Vote caster boundary.
//!
//! Once a payment is confirmed, the purchased votes are recorded against
//! the candidate. The reconciler only depends on the trait; the default
//! implementation writes to the `votes` ledger table.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;

/// Everything the caster needs to record a confirmed purchase's votes.
#[derive(Debug, Clone)]
pub struct CastVotes {
    pub candidate_id: Uuid,
    pub category_id: Uuid,
    pub event_id: Uuid,
    pub vote_count: i32,
    pub voter_ip: String,
}

/// Records purchased votes once payment is confirmed.
///
/// Called at most once per payment, by the transition-causing confirmation
/// only. A failure here (e.g. the voting window has closed) is recorded on
/// the payment and reviewed by a human; it never reverts the payment.
#[async_trait]
pub trait VoteCaster: Send + Sync {
    async fn cast(&self, request: CastVotes) -> Result<(), AppError>;
}

/// Default caster writing to the `votes` table.
pub struct PgVoteCaster {
    pool: DbPool,
}

impl PgVoteCaster {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoteCaster for PgVoteCaster {
    async fn cast(&self, request: CastVotes) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO votes (candidate_id, category_id, event_id, number_of_votes, voter_ip)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(request.candidate_id)
        .bind(request.category_id)
        .bind(request.event_id)
        .bind(request.vote_count)
        .bind(&request.voter_ip)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
