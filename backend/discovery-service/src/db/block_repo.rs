use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use super::traits::BlockRelationProvider;
use crate::error::Result;

/// Block relations stored in `member_block`
#[derive(Clone)]
pub struct PgBlockRelationProvider {
    pool: PgPool,
}

impl PgBlockRelationProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockRelationProvider for PgBlockRelationProvider {
    async fn blocked_pairs(&self, member_id: Uuid) -> Result<HashSet<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT blocked_member_id FROM member_block WHERE blocker_member_id = $1
            UNION
            SELECT blocker_member_id FROM member_block WHERE blocked_member_id = $1
            "#,
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }
}
