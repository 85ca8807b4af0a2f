use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::traits::ListingStore;
use crate::error::{DiscoveryError, Result};
use crate::models::{ListingRow, RankedListing};
use crate::services::ranked_query::{QueryPlan, RankedQueryBuilder, LISTING_COLUMNS};

/// Page and count must observe the same snapshot
pub const PAGE_AND_COUNT_ISOLATION: &str =
    "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

/// Listing reads over `item` (PostGIS geography) joined with `embedding` (pgvector)
#[derive(Clone)]
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_ranked(rows: Vec<ListingRow>) -> Result<Vec<RankedListing>> {
    rows.into_iter()
        .map(|row| {
            RankedListing::try_from(row).map_err(|e| {
                error!(error = %e, "Malformed item row");
                DiscoveryError::StorageUnavailable(format!("malformed item row: {}", e))
            })
        })
        .collect()
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn fetch_ranked(&self, plan: &QueryPlan) -> Result<(Vec<RankedListing>, i64)> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(PAGE_AND_COUNT_ISOLATION)
            .execute(&mut *tx)
            .await?;

        // SET does not take bind parameters
        let statement_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            plan.timeout.as_millis().max(1)
        );
        sqlx::query(&statement_timeout).execute(&mut *tx).await?;

        let mut page_query = RankedQueryBuilder::page_query(plan);
        let rows: Vec<ListingRow> = page_query
            .build_query_as::<ListingRow>()
            .fetch_all(&mut *tx)
            .await?;

        let mut count_query = RankedQueryBuilder::count_query(plan);
        let total_count: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((into_ranked(rows)?, total_count))
    }

    async fn find_listing(&self, item_id: Uuid) -> Result<Option<RankedListing>> {
        let sql = format!(
            "SELECT {}, NULL::float8 AS distance_meters, NULL::float8 AS cosine_distance, \
             NULL::float8 AS score FROM item i WHERE i.item_id = $1",
            LISTING_COLUMNS
        );

        let row = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(into_ranked(vec![row])?.pop()),
            None => Ok(None),
        }
    }
}
