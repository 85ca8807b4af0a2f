use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::traits::InteractionScoreStore;
use crate::error::Result;
use crate::models::{InteractionDelta, InteractionScore, ItemCategory};

/// Decay-and-add in one statement; the upsert's row lock serializes
/// concurrent events for the same (member, category).
const APPLY_DELTA_SQL: &str = r#"
    INSERT INTO user_interaction_score
        (member_id, item_category, score, view_count, like_count, updated_at)
    VALUES ($1, $2, GREATEST(0.0::float8, $3), GREATEST(0, $4), GREATEST(0, $5), $6)
    ON CONFLICT (member_id, item_category) DO UPDATE
    SET score = GREATEST(
            0.0::float8,
            user_interaction_score.score * EXP(
                -$7 * GREATEST(
                    0.0::float8,
                    EXTRACT(EPOCH FROM ($6 - user_interaction_score.updated_at))::float8 / 86400.0
                )
            ) + $3
        ),
        view_count = GREATEST(0, user_interaction_score.view_count + $4),
        like_count = GREATEST(0, user_interaction_score.like_count + $5),
        updated_at = GREATEST(user_interaction_score.updated_at, $6)
    RETURNING score
"#;

/// One row per member, item and UTC day
const RECORD_VIEW_SQL: &str = r#"
    INSERT INTO view_history (member_id, item_id, viewed_date, viewed_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (member_id, item_id, viewed_date) DO NOTHING
"#;

#[derive(Debug, sqlx::FromRow)]
struct InteractionScoreRow {
    member_id: Uuid,
    item_category: i32,
    score: f64,
    view_count: i32,
    like_count: i32,
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgInteractionScoreStore {
    pool: PgPool,
}

impl PgInteractionScoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionScoreStore for PgInteractionScoreStore {
    async fn apply(
        &self,
        member_id: Uuid,
        category: ItemCategory,
        delta: InteractionDelta,
        at: DateTime<Utc>,
        lambda_per_day: f64,
    ) -> Result<f64> {
        let score: f64 = sqlx::query_scalar(APPLY_DELTA_SQL)
            .bind(member_id)
            .bind(category.code())
            .bind(delta.score)
            .bind(delta.views)
            .bind(delta.likes)
            .bind(at)
            .bind(lambda_per_day)
            .fetch_one(&self.pool)
            .await?;

        Ok(score)
    }

    async fn scores_for_member(&self, member_id: Uuid) -> Result<Vec<InteractionScore>> {
        let rows = sqlx::query_as::<_, InteractionScoreRow>(
            r#"
            SELECT member_id, item_category, score, view_count, like_count, updated_at
            FROM user_interaction_score
            WHERE member_id = $1
            ORDER BY item_category
            "#,
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match ItemCategory::from_code(row.item_category) {
                Some(item_category) => Some(InteractionScore {
                    member_id: row.member_id,
                    item_category,
                    score: row.score,
                    view_count: row.view_count,
                    like_count: row.like_count,
                    updated_at: row.updated_at,
                }),
                None => {
                    warn!(
                        member_id = %row.member_id,
                        code = row.item_category,
                        "Interaction score for unknown category code, ignoring"
                    );
                    None
                }
            })
            .collect())
    }

    async fn apply_item_view(
        &self,
        member_id: Uuid,
        item_id: Uuid,
        category: ItemCategory,
        delta: InteractionDelta,
        at: DateTime<Utc>,
        lambda_per_day: f64,
    ) -> Result<Option<f64>> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(RECORD_VIEW_SQL)
            .bind(member_id)
            .bind(item_id)
            .bind(at.date_naive())
            .bind(at)
            .execute(&mut *tx)
            .await?;

        if recorded.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Ok(None);
        }

        let score: f64 = sqlx::query_scalar(APPLY_DELTA_SQL)
            .bind(member_id)
            .bind(category.code())
            .bind(delta.score)
            .bind(delta.views)
            .bind(delta.likes)
            .bind(at)
            .bind(lambda_per_day)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(score))
    }
}
