use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use super::traits::PreferenceStore;
use crate::error::Result;
use crate::models::ItemCategory;

/// Explicit category selections stored in `member_item_category`
#[derive(Clone)]
pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn explicit_categories(&self, member_id: Uuid) -> Result<HashSet<ItemCategory>> {
        let codes: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT item_category FROM member_item_category WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes.into_iter().filter_map(ItemCategory::from_code).collect())
    }

    async fn replace_explicit_categories(
        &self,
        member_id: Uuid,
        categories: &HashSet<ItemCategory>,
    ) -> Result<()> {
        let codes: Vec<i32> = categories.iter().map(|c| c.code()).collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM member_item_category WHERE member_id = $1")
            .bind(member_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO member_item_category (member_id, item_category)
            SELECT $1, code FROM UNNEST($2::int4[]) AS code
            "#,
        )
        .bind(member_id)
        .bind(codes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
