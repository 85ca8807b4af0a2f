use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::affinity::MemberAffinity;
use super::interaction_tracker::InteractionScoreTracker;
use super::preference_synthesizer::PreferenceEmbeddingSynthesizer;
use super::ranked_query::{QueryPlan, RankedQueryBuilder, RankingMode};
use super::score_compositor::{ScoreBreakdown, ScoreCompositor};
use crate::config::{DiscoveryConfig, ScoringConfig};
use crate::db::{
    BlockRelationProvider, EmbeddingStore, InteractionScoreStore, ListingStore,
    PgBlockRelationProvider, PgEmbeddingStore, PgInteractionScoreStore, PgListingStore,
    PgPreferenceStore, PreferenceStore,
};
use crate::error::{DiscoveryError, Result};
use crate::metrics;
use crate::models::{
    EmbeddingVector, ItemCategory, OriginalType, Page, RankedListing, RankingRequest, SortMode,
};

/// Storage collaborators of the discovery service
#[derive(Clone)]
pub struct DiscoveryStores {
    pub listings: Arc<dyn ListingStore>,
    pub embeddings: Arc<dyn EmbeddingStore>,
    pub interactions: Arc<dyn InteractionScoreStore>,
    pub blocks: Arc<dyn BlockRelationProvider>,
    pub preferences: Arc<dyn PreferenceStore>,
}

impl DiscoveryStores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            listings: Arc::new(PgListingStore::new(pool.clone())),
            embeddings: Arc::new(PgEmbeddingStore::new(pool.clone())),
            interactions: Arc::new(PgInteractionScoreStore::new(pool.clone())),
            blocks: Arc::new(PgBlockRelationProvider::new(pool.clone())),
            preferences: Arc::new(PgPreferenceStore::new(pool)),
        }
    }
}

/// Outcome of saving a member's explicit category selection
#[derive(Debug, Clone)]
pub struct SavedPreference {
    pub member_id: Uuid,
    pub categories: HashSet<ItemCategory>,
    /// `false` when the member has no signal left to synthesize from
    pub embedding_synthesized: bool,
}

/// Discovery request façade
///
/// Validates the request, gathers the block set, resolves the per-mode inputs
/// and hands the compiled plan to [`RankedQueryBuilder`].
#[derive(Clone)]
pub struct DiscoveryService {
    stores: DiscoveryStores,
    query_builder: RankedQueryBuilder,
    synthesizer: PreferenceEmbeddingSynthesizer,
    tracker: InteractionScoreTracker,
    compositor: ScoreCompositor,
    limits: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(
        stores: DiscoveryStores,
        references: Arc<HashMap<ItemCategory, EmbeddingVector>>,
        scoring: ScoringConfig,
        limits: DiscoveryConfig,
    ) -> Self {
        Self {
            query_builder: RankedQueryBuilder::new(stores.listings.clone()),
            synthesizer: PreferenceEmbeddingSynthesizer::new(
                stores.embeddings.clone(),
                stores.interactions.clone(),
                references,
                scoring,
            ),
            tracker: InteractionScoreTracker::new(stores.interactions.clone(), scoring),
            compositor: ScoreCompositor::new(scoring),
            stores,
            limits,
        }
    }

    /// Load the category reference vectors once, then build the service.
    /// An empty reference table is a deployment fault.
    pub async fn bootstrap(
        stores: DiscoveryStores,
        scoring: ScoringConfig,
        limits: DiscoveryConfig,
    ) -> Result<Self> {
        let references = stores.embeddings.category_references().await?;
        if references.is_empty() {
            return Err(DiscoveryError::Config(
                "category_embedding holds no reference vectors".to_string(),
            ));
        }
        info!(
            categories = references.len(),
            total = ItemCategory::ALL.len(),
            "Loaded category reference embeddings"
        );
        Ok(Self::new(stores, Arc::new(references), scoring, limits))
    }

    pub fn tracker(&self) -> &InteractionScoreTracker {
        &self.tracker
    }

    pub fn synthesizer(&self) -> &PreferenceEmbeddingSynthesizer {
        &self.synthesizer
    }

    pub async fn discover(&self, request: RankingRequest) -> Result<Page<RankedListing>> {
        let start = Instant::now();
        let sort_mode = request.sort_mode;

        let result = self.discover_inner(request).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        metrics::record_query(sort_mode.as_str(), status, start.elapsed());

        result
    }

    async fn discover_inner(&self, request: RankingRequest) -> Result<Page<RankedListing>> {
        let timeout = RankedQueryBuilder::validate(&request, &self.limits)?;
        let now = Utc::now();

        let blocked = self.stores.blocks.blocked_pairs(request.requester_id).await?;
        let mut excluded_owners: Vec<Uuid> = blocked.into_iter().collect();
        excluded_owners.sort_unstable();

        let mode = self.resolve_mode(&request, now).await?;

        let plan = QueryPlan {
            requester_id: request.requester_id,
            excluded_owners,
            mode,
            direction: request.sort_direction,
            page_number: request.page_number,
            page_size: request.page_size,
            timeout,
        };

        let page = self.query_builder.query(&plan).await?;

        debug!(
            requester_id = %request.requester_id,
            sort_mode = %request.sort_mode,
            returned = page.items.len(),
            total_count = page.total_count,
            "Discovery page served"
        );

        Ok(page)
    }

    async fn resolve_mode(
        &self,
        request: &RankingRequest,
        now: DateTime<Utc>,
    ) -> Result<RankingMode> {
        match request.sort_mode {
            SortMode::Distance => match (request.origin, request.radius_meters) {
                (Some(origin), Some(radius_meters)) => Ok(RankingMode::Distance {
                    origin,
                    radius_meters,
                }),
                _ => Err(DiscoveryError::InvalidRankingRequest(
                    "DISTANCE sort requires origin and radius_meters".to_string(),
                )),
            },
            SortMode::PreferredCategory => {
                let preference = self.preference_embedding(request.requester_id, now).await?;
                Ok(RankingMode::PreferredCategory { preference })
            }
            SortMode::CreatedDate => Ok(RankingMode::CreatedDate),
            SortMode::Recommended => {
                let affinity = self.member_affinity(request.requester_id, now).await?;
                if affinity.is_empty() {
                    return Err(DiscoveryError::NoPreferenceSignal(request.requester_id));
                }
                Ok(RankingMode::Recommended {
                    affinity,
                    scoring: *self.compositor.config(),
                    now,
                })
            }
        }
    }

    /// Stored preference vector, re-synthesized when absent or stale
    pub async fn preference_embedding(
        &self,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<EmbeddingVector> {
        let stored = self
            .stores
            .embeddings
            .get(member_id, OriginalType::CategoryPreference)
            .await?;

        if let Some(stored) = stored {
            let synthesized_at = stored.source_at.unwrap_or(stored.updated_at);
            let age_secs = (now - synthesized_at).num_seconds().max(0) as u64;
            if age_secs <= self.limits.preference_staleness_secs {
                return Ok(stored.embedding);
            }
            debug!(
                member_id = %member_id,
                synthesized_at = %synthesized_at,
                "Preference embedding is stale, re-synthesizing"
            );
        }

        let explicit = self.stores.preferences.explicit_categories(member_id).await?;
        self.synthesizer.synthesize_at(member_id, &explicit, now).await
    }

    pub async fn member_affinity(
        &self,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<MemberAffinity> {
        let explicit = self.stores.preferences.explicit_categories(member_id).await?;
        let scores = self.tracker.scores(member_id).await?;
        Ok(MemberAffinity::from_signals(
            &explicit,
            &scores,
            now,
            self.tracker.lambda_per_day(),
        ))
    }

    /// Replace the explicit selection and re-synthesize immediately
    pub async fn save_preferred_categories(
        &self,
        member_id: Uuid,
        categories: HashSet<ItemCategory>,
    ) -> Result<SavedPreference> {
        self.stores
            .preferences
            .replace_explicit_categories(member_id, &categories)
            .await?;

        let synthesized = self.synthesizer.synthesize(member_id, &categories).await;
        let embedding_synthesized = match synthesized {
            Ok(_) => true,
            Err(DiscoveryError::NoPreferenceSignal(_)) => false,
            Err(e) => return Err(e),
        };

        info!(
            member_id = %member_id,
            categories = categories.len(),
            embedding_synthesized,
            "Preferred categories saved"
        );

        Ok(SavedPreference {
            member_id,
            categories,
            embedding_synthesized,
        })
    }

    /// Recommendation score of one listing for one member, with components
    pub async fn score_breakdown(
        &self,
        item_id: Uuid,
        member_id: Uuid,
    ) -> Result<ScoreBreakdown> {
        let ranked = self
            .stores
            .listings
            .find_listing(item_id)
            .await?
            .filter(|r| !r.listing.is_deleted)
            .ok_or_else(|| DiscoveryError::NotFound(format!("item {}", item_id)))?;

        let now = Utc::now();
        let affinity = self.member_affinity(member_id, now).await?;

        Ok(self.compositor.score(&ranked.listing, &affinity, now))
    }
}
