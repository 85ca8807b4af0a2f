//! Recommendation score blending
//!
//! `category  = explicit * explicit_weight + implicit * implicit_weight`
//! `freshness = exp(-λ * age_days)`
//! `final     = category * category_weight + freshness * freshness_weight`
//!
//! The same blend is compiled into SQL for the RECOMMENDED sort mode; this
//! type is the in-process rendition used for score breakdowns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::affinity::MemberAffinity;
use crate::config::ScoringConfig;
use crate::models::{elapsed_days, ItemCategory, Listing};

/// Per-listing score with its components
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub item_id: Uuid,
    pub item_category: ItemCategory,
    pub explicit_component: f64,
    pub implicit_component: f64,
    pub category_score: f64,
    pub freshness_score: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreCompositor {
    config: ScoringConfig,
}

impl ScoreCompositor {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn category_score(&self, explicit_component: f64, implicit_component: f64) -> f64 {
        explicit_component * self.config.explicit_weight
            + implicit_component * self.config.implicit_weight
    }

    /// `exp(-λ * age_days)`; listings dated in the future count as brand new
    pub fn freshness_score(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        (-self.config.time_decay_lambda * elapsed_days(created_at, now)).exp()
    }

    pub fn final_score(&self, category_score: f64, freshness_score: f64) -> f64 {
        category_score * self.config.category_weight
            + freshness_score * self.config.freshness_weight
    }

    pub fn score(
        &self,
        listing: &Listing,
        affinity: &MemberAffinity,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let explicit_component = affinity.explicit_component(listing.item_category);
        let implicit_component = affinity.implicit_component(listing.item_category);
        let category_score = self.category_score(explicit_component, implicit_component);
        let freshness_score = self.freshness_score(listing.created_at, now);

        ScoreBreakdown {
            item_id: listing.item_id,
            item_category: listing.item_category,
            explicit_component,
            implicit_component,
            category_score,
            freshness_score,
            final_score: self.final_score(category_score, freshness_score),
        }
    }
}
