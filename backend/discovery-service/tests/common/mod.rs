//! In-memory collaborators for integration tests
//!
//! Each fake mirrors the semantics of its Postgres counterpart (filters,
//! ordering, decay-and-add upsert, monotonic embedding replacement) so the
//! services can be exercised without a database.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use discovery_service::config::{DiscoveryConfig, ScoringConfig};
use discovery_service::db::{
    BlockRelationProvider, EmbeddingStore, InteractionScoreStore, ListingStore, PreferenceStore,
};
use discovery_service::models::{
    decay_score, EmbeddingVector, GeoPoint, InteractionDelta, InteractionScore, ItemCategory,
    ItemCondition, ItemStatus, Listing, OriginalType, RankedListing, SortDirection,
    StoredEmbedding,
};
use discovery_service::{
    DiscoveryError, DiscoveryService, DiscoveryStores, QueryPlan, RankingMode, Result,
    ScoreCompositor,
};

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

pub fn haversine_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// Point `meters` due north of `origin`
pub fn north_of(origin: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(
        origin.longitude,
        origin.latitude + (meters / EARTH_RADIUS_METERS).to_degrees(),
    )
}

pub fn listing(owner_id: Uuid, category: ItemCategory, location: GeoPoint) -> Listing {
    Listing {
        item_id: Uuid::new_v4(),
        owner_id,
        item_name: format!("{:?} listing", category),
        item_category: category,
        item_condition: ItemCondition::SlightlyUsed,
        item_status: ItemStatus::Available,
        price: 10_000,
        location,
        like_count: 0,
        is_deleted: false,
        created_at: Utc::now(),
    }
}

/// One orthogonal reference vector per category
pub fn reference_embeddings() -> HashMap<ItemCategory, EmbeddingVector> {
    ItemCategory::ALL
        .iter()
        .map(|c| (*c, EmbeddingVector::basis(c.code() as usize)))
        .collect()
}

#[derive(Default)]
pub struct InMemoryListingStore {
    listings: Mutex<Vec<Listing>>,
    item_embeddings: Mutex<HashMap<Uuid, EmbeddingVector>>,
    delay: Mutex<Option<Duration>>,
    fail: AtomicBool,
    fetch_calls: AtomicUsize,
}

impl InMemoryListingStore {
    pub fn insert(&self, listing: Listing) -> Uuid {
        let id = listing.item_id;
        self.listings.lock().unwrap().push(listing);
        id
    }

    pub fn insert_with_embedding(&self, listing: Listing, embedding: EmbeddingVector) -> Uuid {
        let id = self.insert(listing);
        self.item_embeddings.lock().unwrap().insert(id, embedding);
        id
    }

    pub fn soft_delete(&self, item_id: Uuid) {
        for listing in self.listings.lock().unwrap().iter_mut() {
            if listing.item_id == item_id {
                listing.is_deleted = true;
            }
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, AtomicOrdering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(AtomicOrdering::SeqCst)
    }

    fn rank(&self, plan: &QueryPlan) -> Vec<(RankedListing, f64)> {
        let listings = self.listings.lock().unwrap().clone();
        let embeddings = self.item_embeddings.lock().unwrap().clone();

        listings
            .into_iter()
            .filter(|l| !l.is_deleted)
            .filter(|l| l.owner_id != plan.requester_id)
            .filter(|l| !plan.excluded_owners.contains(&l.owner_id))
            .filter_map(|l| match &plan.mode {
                RankingMode::Distance {
                    origin,
                    radius_meters,
                } => {
                    let d = haversine_meters(origin, &l.location);
                    (d <= *radius_meters).then(|| {
                        let mut ranked = RankedListing::unranked(l);
                        ranked.distance_meters = Some(d);
                        (ranked, d)
                    })
                }
                RankingMode::PreferredCategory { preference } => {
                    let embedding = embeddings.get(&l.item_id)?;
                    let d = preference.cosine_distance(embedding).unwrap_or(1.0);
                    let mut ranked = RankedListing::unranked(l);
                    ranked.cosine_distance = Some(d);
                    Some((ranked, d))
                }
                RankingMode::CreatedDate => {
                    let key = l.created_at.timestamp_micros() as f64;
                    Some((RankedListing::unranked(l), key))
                }
                RankingMode::Recommended {
                    affinity,
                    scoring,
                    now,
                } => {
                    let score = ScoreCompositor::new(*scoring)
                        .score(&l, affinity, *now)
                        .final_score;
                    let mut ranked = RankedListing::unranked(l);
                    ranked.score = Some(score);
                    Some((ranked, score))
                }
            })
            .collect()
    }
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn fetch_ranked(&self, plan: &QueryPlan) -> Result<(Vec<RankedListing>, i64)> {
        self.fetch_calls.fetch_add(1, AtomicOrdering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(AtomicOrdering::SeqCst) {
            return Err(DiscoveryError::StorageUnavailable(
                "count query failed".to_string(),
            ));
        }

        let mut ranked = self.rank(plan);
        ranked.sort_by(|(a, ka), (b, kb)| {
            let by_key = ka.partial_cmp(kb).unwrap_or(Ordering::Equal);
            let by_key = match plan.direction {
                SortDirection::Asc => by_key,
                SortDirection::Desc => by_key.reverse(),
            };
            by_key.then_with(|| a.listing.item_id.cmp(&b.listing.item_id))
        });

        let total = ranked.len() as i64;
        let page = ranked
            .into_iter()
            .skip(plan.offset() as usize)
            .take(plan.limit() as usize)
            .map(|(listing, _)| listing)
            .collect();

        Ok((page, total))
    }

    async fn find_listing(&self, item_id: Uuid) -> Result<Option<RankedListing>> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.item_id == item_id)
            .cloned()
            .map(RankedListing::unranked))
    }
}

#[derive(Default)]
pub struct InMemoryEmbeddingStore {
    rows: Mutex<HashMap<(Uuid, OriginalType), StoredEmbedding>>,
    references: Mutex<HashMap<ItemCategory, EmbeddingVector>>,
    replace_calls: AtomicUsize,
}

impl InMemoryEmbeddingStore {
    pub fn with_references(references: HashMap<ItemCategory, EmbeddingVector>) -> Self {
        Self {
            references: Mutex::new(references),
            ..Self::default()
        }
    }

    pub fn stored(&self, original_id: Uuid, original_type: OriginalType) -> Option<StoredEmbedding> {
        self.rows
            .lock()
            .unwrap()
            .get(&(original_id, original_type))
            .cloned()
    }

    pub fn put(&self, stored: StoredEmbedding) {
        self.rows
            .lock()
            .unwrap()
            .insert((stored.original_id, stored.original_type), stored);
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn get(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
    ) -> Result<Option<StoredEmbedding>> {
        Ok(self.stored(original_id, original_type))
    }

    async fn replace(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
        embedding: &EmbeddingVector,
        source_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.replace_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut rows = self.rows.lock().unwrap();

        if let Some(existing) = rows.get(&(original_id, original_type)) {
            if matches!(existing.source_at, Some(at) if at > source_at) {
                return Ok(false);
            }
        }

        rows.insert(
            (original_id, original_type),
            StoredEmbedding {
                original_id,
                original_type,
                embedding: embedding.clone(),
                source_at: Some(source_at),
                updated_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn delete(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
        source_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();

        if let Some(existing) = rows.get(&(original_id, original_type)) {
            if matches!(existing.source_at, Some(at) if at > source_at) {
                return Ok(false);
            }
        }

        Ok(rows.remove(&(original_id, original_type)).is_some())
    }

    async fn nearest(
        &self,
        query: &EmbeddingVector,
        original_type: OriginalType,
        limit: i64,
    ) -> Result<Vec<(Uuid, f64)>> {
        let rows = self.rows.lock().unwrap();
        let mut hits: Vec<(Uuid, f64)> = rows
            .values()
            .filter(|r| r.original_type == original_type)
            .map(|r| (r.original_id, query.cosine_distance(&r.embedding).unwrap_or(1.0)))
            .collect();
        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn category_references(&self) -> Result<HashMap<ItemCategory, EmbeddingVector>> {
        Ok(self.references.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct InMemoryInteractionStore {
    rows: Mutex<HashMap<(Uuid, ItemCategory), InteractionScore>>,
    views: Mutex<HashSet<(Uuid, Uuid, NaiveDate)>>,
    offline: AtomicBool,
}

impl InMemoryInteractionStore {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    pub fn row(&self, member_id: Uuid, category: ItemCategory) -> Option<InteractionScore> {
        self.rows
            .lock()
            .unwrap()
            .get(&(member_id, category))
            .cloned()
    }

    /// Decay-and-add with the same clamping as the SQL upsert
    fn upsert(
        &self,
        member_id: Uuid,
        category: ItemCategory,
        delta: InteractionDelta,
        at: DateTime<Utc>,
        lambda_per_day: f64,
    ) -> f64 {
        let mut rows = self.rows.lock().unwrap();

        let row = rows
            .entry((member_id, category))
            .and_modify(|row| {
                let decayed = decay_score(row.score, row.updated_at, at, lambda_per_day);
                row.score = (decayed + delta.score).max(0.0);
                row.view_count = (row.view_count + delta.views).max(0);
                row.like_count = (row.like_count + delta.likes).max(0);
                row.updated_at = row.updated_at.max(at);
            })
            .or_insert_with(|| InteractionScore {
                member_id,
                item_category: category,
                score: delta.score.max(0.0),
                view_count: delta.views.max(0),
                like_count: delta.likes.max(0),
                updated_at: at,
            });

        row.score
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(DiscoveryError::StorageUnavailable(
                "interaction store offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InteractionScoreStore for InMemoryInteractionStore {
    async fn apply(
        &self,
        member_id: Uuid,
        category: ItemCategory,
        delta: InteractionDelta,
        at: DateTime<Utc>,
        lambda_per_day: f64,
    ) -> Result<f64> {
        self.check_online()?;
        Ok(self.upsert(member_id, category, delta, at, lambda_per_day))
    }

    async fn scores_for_member(&self, member_id: Uuid) -> Result<Vec<InteractionScore>> {
        self.check_online()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.member_id == member_id)
            .cloned()
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
        // All or nothing: an offline store records neither the view nor the score
        self.check_online()?;
        let mut views = self.views.lock().unwrap();
        if !views.insert((member_id, item_id, at.date_naive())) {
            return Ok(None);
        }
        Ok(Some(self.upsert(member_id, category, delta, at, lambda_per_day)))
    }
}

#[derive(Default)]
pub struct InMemoryBlockProvider {
    pairs: Mutex<Vec<(Uuid, Uuid)>>,
}

impl InMemoryBlockProvider {
    pub fn block(&self, blocker: Uuid, blocked: Uuid) {
        self.pairs.lock().unwrap().push((blocker, blocked));
    }
}

#[async_trait]
impl BlockRelationProvider for InMemoryBlockProvider {
    async fn blocked_pairs(&self, member_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(blocker, blocked)| {
                if *blocker == member_id {
                    Some(*blocked)
                } else if *blocked == member_id {
                    Some(*blocker)
                } else {
                    None
                }
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    rows: Mutex<HashMap<Uuid, HashSet<ItemCategory>>>,
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn explicit_categories(&self, member_id: Uuid) -> Result<HashSet<ItemCategory>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&member_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_explicit_categories(
        &self,
        member_id: Uuid,
        categories: &HashSet<ItemCategory>,
    ) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(member_id, categories.clone());
        Ok(())
    }
}

/// All fakes wired together
pub struct Fixture {
    pub listings: Arc<InMemoryListingStore>,
    pub embeddings: Arc<InMemoryEmbeddingStore>,
    pub interactions: Arc<InMemoryInteractionStore>,
    pub blocks: Arc<InMemoryBlockProvider>,
    pub preferences: Arc<InMemoryPreferenceStore>,
    pub scoring: ScoringConfig,
    pub limits: DiscoveryConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            listings: Arc::new(InMemoryListingStore::default()),
            embeddings: Arc::new(InMemoryEmbeddingStore::with_references(
                reference_embeddings(),
            )),
            interactions: Arc::new(InMemoryInteractionStore::default()),
            blocks: Arc::new(InMemoryBlockProvider::default()),
            preferences: Arc::new(InMemoryPreferenceStore::default()),
            scoring: ScoringConfig::default(),
            limits: DiscoveryConfig::default(),
        }
    }

    pub fn stores(&self) -> DiscoveryStores {
        DiscoveryStores {
            listings: self.listings.clone(),
            embeddings: self.embeddings.clone(),
            interactions: self.interactions.clone(),
            blocks: self.blocks.clone(),
            preferences: self.preferences.clone(),
        }
    }

    pub fn service(&self) -> DiscoveryService {
        DiscoveryService::new(
            self.stores(),
            Arc::new(reference_embeddings()),
            self.scoring,
            self.limits,
        )
    }
}
