use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::models::{InteractionScore, ItemCategory};

/// A member's preference signal at one instant
///
/// `explicit` is the declared selection; `implicit_share` maps each category
/// with a positive decayed interaction score to its fraction of the member's
/// total, so the shares sum to 1 whenever any exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberAffinity {
    pub explicit: BTreeSet<ItemCategory>,
    pub implicit_share: BTreeMap<ItemCategory, f64>,
}

impl MemberAffinity {
    pub fn from_signals(
        explicit: &HashSet<ItemCategory>,
        scores: &[InteractionScore],
        now: DateTime<Utc>,
        lambda_per_day: f64,
    ) -> Self {
        let decayed: Vec<(ItemCategory, f64)> = scores
            .iter()
            .map(|s| (s.item_category, s.decayed_at(now, lambda_per_day)))
            .filter(|(_, score)| score.is_finite() && *score > 0.0)
            .collect();

        let total: f64 = decayed.iter().map(|(_, score)| score).sum();

        let mut implicit_share = BTreeMap::new();
        if total > 0.0 {
            for (category, score) in decayed {
                *implicit_share.entry(category).or_insert(0.0) += score / total;
            }
        }

        Self {
            explicit: explicit.iter().copied().collect(),
            implicit_share,
        }
    }

    /// No explicit selection and no live interaction history
    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty() && self.implicit_share.is_empty()
    }

    pub fn explicit_component(&self, category: ItemCategory) -> f64 {
        if self.explicit.contains(&category) {
            1.0
        } else {
            0.0
        }
    }

    pub fn implicit_component(&self, category: ItemCategory) -> f64 {
        self.implicit_share.get(&category).copied().unwrap_or(0.0)
    }

    /// Every category that carries any signal, in code order
    pub fn categories(&self) -> BTreeSet<ItemCategory> {
        self.explicit
            .iter()
            .chain(self.implicit_share.keys())
            .copied()
            .collect()
    }
}
