use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    EmbeddingVector, InteractionDelta, InteractionScore, ItemCategory, OriginalType,
    RankedListing, StoredEmbedding,
};
use crate::services::ranked_query::QueryPlan;

/// Fixed-width vectors keyed by `(original_id, original_type)`
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn get(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
    ) -> Result<Option<StoredEmbedding>>;

    /// Fully replace the stored vector.
    /// Returns `false` when the stored row carries a newer `source_at` and was kept.
    async fn replace(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
        embedding: &EmbeddingVector,
        source_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Remove the stored vector under the same `source_at` guard as `replace`.
    /// Returns `false` when nothing was removed.
    async fn delete(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
        source_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Ids of `original_type` rows closest to `query` by cosine distance, nearest first
    async fn nearest(
        &self,
        query: &EmbeddingVector,
        original_type: OriginalType,
        limit: i64,
    ) -> Result<Vec<(Uuid, f64)>>;

    /// Read-only reference vector per category
    async fn category_references(&self) -> Result<HashMap<ItemCategory, EmbeddingVector>>;
}

/// Per (member, category) implicit affinity rows
#[async_trait]
pub trait InteractionScoreStore: Send + Sync {
    /// Atomically decay the stored score to `at`, add `delta.score` and clamp at zero.
    /// Returns the new score.
    async fn apply(
        &self,
        member_id: Uuid,
        category: ItemCategory,
        delta: InteractionDelta,
        at: DateTime<Utc>,
        lambda_per_day: f64,
    ) -> Result<f64>;

    async fn scores_for_member(&self, member_id: Uuid) -> Result<Vec<InteractionScore>>;

    /// Record a view of `item_id` on `at`'s UTC date and apply `delta` in one
    /// transaction. Returns `None` when the member already viewed the item that day;
    /// a failed apply leaves no view recorded.
    async fn apply_item_view(
        &self,
        member_id: Uuid,
        item_id: Uuid,
        category: ItemCategory,
        delta: InteractionDelta,
        at: DateTime<Utc>,
        lambda_per_day: f64,
    ) -> Result<Option<f64>>;
}

/// Member-to-member block relations
#[async_trait]
pub trait BlockRelationProvider: Send + Sync {
    /// Members blocked by, or blocking, `member_id`
    async fn blocked_pairs(&self, member_id: Uuid) -> Result<HashSet<Uuid>>;
}

/// Explicit category selections
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn explicit_categories(&self, member_id: Uuid) -> Result<HashSet<ItemCategory>>;

    async fn replace_explicit_categories(
        &self,
        member_id: Uuid,
        categories: &HashSet<ItemCategory>,
    ) -> Result<()>;
}

/// Listing reads for discovery
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// One page plus the exact total, read from a single snapshot
    async fn fetch_ranked(&self, plan: &QueryPlan) -> Result<(Vec<RankedListing>, i64)>;

    async fn find_listing(&self, item_id: Uuid) -> Result<Option<RankedListing>>;
}
