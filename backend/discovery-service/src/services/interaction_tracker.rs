// Interaction score tracking
//
// score(t) = score(t0) * exp(-λ * days(t - t0)) + increment
//
// Increments:
// - View: view_increment
// - Like: view_increment * like_multiplier
// - Unlike: -(view_increment * like_multiplier), clamped at 0
//
// Decay and add happen inside one upsert statement, so concurrent events for
// the same (member, category) serialize on the row lock.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::db::InteractionScoreStore;
use crate::error::Result;
use crate::metrics;
use crate::models::{
    InteractionDelta, InteractionEvent, InteractionScore, InteractionType, ItemCategory,
};

/// What happened to an ingested event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventOutcome {
    /// Score updated to the contained value
    Applied(f64),
    /// Same item already viewed today
    Deduplicated,
    /// Store failed; logged and dropped
    Dropped,
}

#[derive(Clone)]
pub struct InteractionScoreTracker {
    store: Arc<dyn InteractionScoreStore>,
    config: ScoringConfig,
}

impl InteractionScoreTracker {
    pub fn new(store: Arc<dyn InteractionScoreStore>, config: ScoringConfig) -> Self {
        Self { store, config }
    }

    pub fn delta_for(&self, interaction_type: InteractionType) -> InteractionDelta {
        match interaction_type {
            InteractionType::View => InteractionDelta {
                score: self.config.view_increment,
                views: 1,
                likes: 0,
            },
            InteractionType::Like => InteractionDelta {
                score: self.config.like_increment(),
                views: 0,
                likes: 1,
            },
            InteractionType::Unlike => InteractionDelta {
                score: -self.config.like_increment(),
                views: 0,
                likes: -1,
            },
        }
    }

    pub async fn record_view(&self, member_id: Uuid, category: ItemCategory) -> Result<f64> {
        self.apply_at(member_id, category, InteractionType::View, Utc::now())
            .await
    }

    pub async fn record_like(&self, member_id: Uuid, category: ItemCategory) -> Result<f64> {
        self.apply_at(member_id, category, InteractionType::Like, Utc::now())
            .await
    }

    pub async fn record_unlike(&self, member_id: Uuid, category: ItemCategory) -> Result<f64> {
        self.apply_at(member_id, category, InteractionType::Unlike, Utc::now())
            .await
    }

    /// View of a concrete item; counts at most once per member, item and UTC day.
    /// The view marker and the score move together, so a failed update can be retried.
    /// Returns `None` when deduplicated.
    pub async fn record_item_view(
        &self,
        member_id: Uuid,
        item_id: Uuid,
        category: ItemCategory,
    ) -> Result<Option<f64>> {
        let score = self
            .store
            .apply_item_view(
                member_id,
                item_id,
                category,
                self.delta_for(InteractionType::View),
                Utc::now(),
                self.config.time_decay_lambda,
            )
            .await?;

        match score {
            Some(score) => debug!(
                member_id = %member_id,
                item_id = %item_id,
                category = %category,
                score,
                "Item view counted"
            ),
            None => debug!(
                member_id = %member_id,
                item_id = %item_id,
                "View already counted today"
            ),
        }

        Ok(score)
    }

    /// Decay, add and persist as of `at`
    pub async fn apply_at(
        &self,
        member_id: Uuid,
        category: ItemCategory,
        interaction_type: InteractionType,
        at: DateTime<Utc>,
    ) -> Result<f64> {
        let delta = self.delta_for(interaction_type);
        let score = self
            .store
            .apply(
                member_id,
                category,
                delta,
                at,
                self.config.time_decay_lambda,
            )
            .await?;

        debug!(
            member_id = %member_id,
            category = %category,
            interaction_type = %interaction_type,
            score,
            "Interaction score updated"
        );

        Ok(score)
    }

    /// Best-effort ingestion; never fails the triggering user action
    pub async fn ingest(&self, event: InteractionEvent) -> EventOutcome {
        let result = match (event.interaction_type, event.item_id) {
            (InteractionType::View, Some(item_id)) => {
                self.record_item_view(event.member_id, item_id, event.item_category)
                    .await
            }
            (interaction_type, _) => self
                .apply_at(
                    event.member_id,
                    event.item_category,
                    interaction_type,
                    Utc::now(),
                )
                .await
                .map(Some),
        };

        let label = event.interaction_type.as_str();
        match result {
            Ok(Some(score)) => {
                metrics::record_interaction_event(label, "applied");
                EventOutcome::Applied(score)
            }
            Ok(None) => {
                metrics::record_interaction_event(label, "deduplicated");
                EventOutcome::Deduplicated
            }
            Err(e) => {
                warn!(
                    member_id = %event.member_id,
                    category = %event.item_category,
                    interaction_type = %event.interaction_type,
                    error = %e,
                    "Dropping interaction event"
                );
                metrics::record_interaction_event(label, "dropped");
                EventOutcome::Dropped
            }
        }
    }

    /// Stored rows for a member; read through `InteractionScore::decayed_at`
    pub async fn scores(&self, member_id: Uuid) -> Result<Vec<InteractionScore>> {
        self.store.scores_for_member(member_id).await
    }

    pub fn lambda_per_day(&self) -> f64 {
        self.config.time_decay_lambda
    }
}
