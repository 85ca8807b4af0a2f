pub mod affinity;
pub mod discovery;
pub mod interaction_tracker;
pub mod preference_synthesizer;
pub mod ranked_query;
pub mod score_compositor;

pub use affinity::MemberAffinity;
pub use discovery::{DiscoveryService, DiscoveryStores, SavedPreference};
pub use interaction_tracker::{EventOutcome, InteractionScoreTracker};
pub use preference_synthesizer::PreferenceEmbeddingSynthesizer;
pub use ranked_query::{QueryPlan, RankedQueryBuilder, RankingMode};
pub use score_compositor::{ScoreBreakdown, ScoreCompositor};
