pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{DiscoveryError, Result};

pub use services::{
    DiscoveryService, DiscoveryStores, InteractionScoreTracker, MemberAffinity,
    PreferenceEmbeddingSynthesizer, QueryPlan, RankedQueryBuilder, RankingMode, ScoreBreakdown,
    ScoreCompositor,
};
