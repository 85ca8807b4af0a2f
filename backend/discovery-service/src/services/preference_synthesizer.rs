use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::affinity::MemberAffinity;
use crate::config::ScoringConfig;
use crate::db::{EmbeddingStore, InteractionScoreStore};
use crate::error::{DiscoveryError, Result};
use crate::metrics;
use crate::models::{EmbeddingVector, ItemCategory, OriginalType};

/// Builds a member's preference vector from category reference embeddings
///
/// Each category with any signal is weighted by
/// `explicit_weight * [selected] + implicit_weight * share`, and the result is
/// the weighted mean of the reference vectors. The stored vector is replaced
/// whole, unless a newer synthesis already landed.
#[derive(Clone)]
pub struct PreferenceEmbeddingSynthesizer {
    embeddings: Arc<dyn EmbeddingStore>,
    scores: Arc<dyn InteractionScoreStore>,
    references: Arc<HashMap<ItemCategory, EmbeddingVector>>,
    config: ScoringConfig,
}

impl PreferenceEmbeddingSynthesizer {
    pub fn new(
        embeddings: Arc<dyn EmbeddingStore>,
        scores: Arc<dyn InteractionScoreStore>,
        references: Arc<HashMap<ItemCategory, EmbeddingVector>>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            embeddings,
            scores,
            references,
            config,
        }
    }

    pub async fn synthesize(
        &self,
        member_id: Uuid,
        explicit: &HashSet<ItemCategory>,
    ) -> Result<EmbeddingVector> {
        self.synthesize_at(member_id, explicit, Utc::now()).await
    }

    /// Synthesize from inputs read at `now`, which becomes the stored `source_at`
    pub async fn synthesize_at(
        &self,
        member_id: Uuid,
        explicit: &HashSet<ItemCategory>,
        now: DateTime<Utc>,
    ) -> Result<EmbeddingVector> {
        let result = self.run(member_id, explicit, now).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(DiscoveryError::NoPreferenceSignal(_)) => "no_signal",
            Err(_) => "error",
        };
        metrics::record_preference_synthesis(status);

        result
    }

    async fn run(
        &self,
        member_id: Uuid,
        explicit: &HashSet<ItemCategory>,
        now: DateTime<Utc>,
    ) -> Result<EmbeddingVector> {
        let scores = self.scores.scores_for_member(member_id).await?;
        let affinity =
            MemberAffinity::from_signals(explicit, &scores, now, self.config.time_decay_lambda);

        let vector = match self.compose(member_id, &affinity) {
            Ok(vector) => vector,
            Err(e @ DiscoveryError::NoPreferenceSignal(_)) => {
                // A member with no signal left keeps no preference vector
                let cleared = self
                    .embeddings
                    .delete(member_id, OriginalType::CategoryPreference, now)
                    .await?;
                if cleared {
                    info!(member_id = %member_id, "Preference embedding cleared");
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let replaced = self
            .embeddings
            .replace(member_id, OriginalType::CategoryPreference, &vector, now)
            .await?;

        if replaced {
            info!(
                member_id = %member_id,
                explicit = affinity.explicit.len(),
                implicit = affinity.implicit_share.len(),
                "Preference embedding replaced"
            );
            return Ok(vector);
        }

        debug!(
            member_id = %member_id,
            "Newer preference embedding already stored, keeping it"
        );
        let stored = self
            .embeddings
            .get(member_id, OriginalType::CategoryPreference)
            .await?;

        Ok(stored.map(|s| s.embedding).unwrap_or(vector))
    }

    /// Weighted mean of reference vectors; no I/O
    pub fn compose(&self, member_id: Uuid, affinity: &MemberAffinity) -> Result<EmbeddingVector> {
        if affinity.is_empty() {
            return Err(DiscoveryError::NoPreferenceSignal(member_id));
        }

        let mut weighted = Vec::new();
        for category in affinity.categories() {
            let weight = self.config.explicit_weight * affinity.explicit_component(category)
                + self.config.implicit_weight * affinity.implicit_component(category);

            match self.references.get(&category) {
                Some(reference) => weighted.push((reference, weight)),
                None => warn!(
                    member_id = %member_id,
                    category = %category,
                    "No reference embedding for category, skipping"
                ),
            }
        }

        EmbeddingVector::weighted_average(weighted)
            .ok_or(DiscoveryError::NoPreferenceSignal(member_id))
    }
}
