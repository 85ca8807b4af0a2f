//! Ranked listing query compilation
//!
//! A [`QueryPlan`] is a validated request with its mode inputs resolved
//! (origin, preference vector, affinity). It compiles to two statements that
//! share one FROM/WHERE emitter: the page query and the exact count query.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::affinity::MemberAffinity;
use crate::config::{DiscoveryConfig, ScoringConfig};
use crate::db::ListingStore;
use crate::error::{DiscoveryError, Result};
use crate::models::{
    EmbeddingVector, GeoPoint, OriginalType, Page, RankedListing, RankingRequest, SortDirection,
    SortMode,
};

pub(crate) const LISTING_COLUMNS: &str = "i.item_id, i.member_id, i.item_name, i.item_category, \
     i.item_condition, i.item_status, i.price, \
     ST_X(i.location::geometry) AS longitude, ST_Y(i.location::geometry) AS latitude, \
     i.like_count, i.is_deleted, i.created_at";

/// Sort mode with the inputs it needs
#[derive(Debug, Clone)]
pub enum RankingMode {
    Distance {
        origin: GeoPoint,
        radius_meters: f64,
    },
    PreferredCategory {
        preference: EmbeddingVector,
    },
    CreatedDate,
    Recommended {
        affinity: MemberAffinity,
        scoring: ScoringConfig,
        now: DateTime<Utc>,
    },
}

impl RankingMode {
    pub fn sort_mode(&self) -> SortMode {
        match self {
            RankingMode::Distance { .. } => SortMode::Distance,
            RankingMode::PreferredCategory { .. } => SortMode::PreferredCategory,
            RankingMode::CreatedDate => SortMode::CreatedDate,
            RankingMode::Recommended { .. } => SortMode::Recommended,
        }
    }

    fn order_key(&self) -> &'static str {
        match self {
            RankingMode::Distance { .. } => "distance_meters",
            RankingMode::PreferredCategory { .. } => "cosine_distance",
            RankingMode::CreatedDate => "i.created_at",
            RankingMode::Recommended { .. } => "score",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub requester_id: Uuid,
    /// Owners hidden from the requester (block relations in either direction)
    pub excluded_owners: Vec<Uuid>,
    pub mode: RankingMode,
    pub direction: SortDirection,
    pub page_number: u32,
    pub page_size: u32,
    /// Budget for page and count together
    pub timeout: Duration,
}

impl QueryPlan {
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page_number) * i64::from(self.page_size)
    }
}

/// Compiles and runs ranked listing queries
///
/// Holds no per-request state; every call is independent.
#[derive(Clone)]
pub struct RankedQueryBuilder {
    store: Arc<dyn ListingStore>,
}

impl RankedQueryBuilder {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Reject requests that cannot be compiled, before any I/O.
    /// Returns the effective timeout.
    pub fn validate(request: &RankingRequest, limits: &DiscoveryConfig) -> Result<Duration> {
        if request.page_size == 0 || request.page_size > limits.max_page_size {
            return Err(DiscoveryError::InvalidRankingRequest(format!(
                "page_size must be between 1 and {}",
                limits.max_page_size
            )));
        }

        if request.sort_mode == SortMode::Distance {
            let origin = request.origin.ok_or_else(|| {
                DiscoveryError::InvalidRankingRequest(
                    "DISTANCE sort requires longitude and latitude".to_string(),
                )
            })?;
            if !origin.is_valid() {
                return Err(DiscoveryError::InvalidRankingRequest(format!(
                    "origin ({}, {}) is not a WGS84 coordinate",
                    origin.longitude, origin.latitude
                )));
            }
            match request.radius_meters {
                Some(r) if r.is_finite() && r > 0.0 => {}
                Some(r) => {
                    return Err(DiscoveryError::InvalidRankingRequest(format!(
                        "radius_meters must be positive, got {}",
                        r
                    )))
                }
                None => {
                    return Err(DiscoveryError::InvalidRankingRequest(
                        "DISTANCE sort requires radius_meters".to_string(),
                    ))
                }
            }
        }

        let ceiling = limits.query_timeout_ms;
        let timeout_ms = match request.timeout_ms {
            Some(0) => {
                return Err(DiscoveryError::InvalidRankingRequest(
                    "timeout_ms must be positive".to_string(),
                ))
            }
            Some(ms) => ms.min(ceiling),
            None => ceiling,
        };

        Ok(Duration::from_millis(timeout_ms))
    }

    /// Run page and count; both complete or the call fails
    pub async fn query(&self, plan: &QueryPlan) -> Result<Page<RankedListing>> {
        debug!(
            requester_id = %plan.requester_id,
            sort_mode = %plan.mode.sort_mode(),
            page_number = plan.page_number,
            page_size = plan.page_size,
            excluded = plan.excluded_owners.len(),
            "Running ranked listing query"
        );

        let (items, total_count) =
            match tokio::time::timeout(plan.timeout, self.store.fetch_ranked(plan)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        requester_id = %plan.requester_id,
                        timeout_ms = plan.timeout.as_millis() as u64,
                        "Ranked listing query timed out"
                    );
                    return Err(DiscoveryError::StorageUnavailable(format!(
                        "ranking query exceeded {} ms",
                        plan.timeout.as_millis()
                    )));
                }
            };

        Ok(Page {
            items,
            total_count,
            page_number: plan.page_number,
            page_size: plan.page_size,
        })
    }

    /// SELECT with the per-mode key columns, ordered, limited
    pub fn page_query(plan: &QueryPlan) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(LISTING_COLUMNS);

        qb.push(", ");
        match &plan.mode {
            RankingMode::Distance { origin, .. } => {
                qb.push("ST_Distance(i.location, ");
                push_point(&mut qb, origin);
                qb.push(")");
            }
            _ => {
                qb.push("NULL::float8");
            }
        }
        qb.push(" AS distance_meters, ");

        match &plan.mode {
            RankingMode::PreferredCategory { preference } => {
                qb.push("(e.embedding <=> ");
                qb.push_bind(preference.to_literal());
                qb.push("::text::vector)::float8");
            }
            _ => {
                qb.push("NULL::float8");
            }
        }
        qb.push(" AS cosine_distance, ");

        match &plan.mode {
            RankingMode::Recommended {
                affinity,
                scoring,
                now,
            } => push_recommended_score(&mut qb, affinity, scoring, *now),
            _ => {
                qb.push("NULL::float8");
            }
        }
        qb.push(" AS score");

        push_from_and_filters(&mut qb, plan);

        qb.push(" ORDER BY ");
        qb.push(plan.mode.order_key());
        qb.push(" ");
        qb.push(plan.direction.as_sql());
        qb.push(", i.item_id ASC LIMIT ");
        qb.push_bind(plan.limit());
        qb.push(" OFFSET ");
        qb.push_bind(plan.offset());

        qb
    }

    /// Exact total over the same joins and filters as `page_query`
    pub fn count_query(plan: &QueryPlan) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*)");
        push_from_and_filters(&mut qb, plan);
        qb
    }
}

fn push_point(qb: &mut QueryBuilder<'static, Postgres>, point: &GeoPoint) {
    qb.push("ST_SetSRID(ST_MakePoint(");
    qb.push_bind(point.longitude);
    qb.push(", ");
    qb.push_bind(point.latitude);
    qb.push("), 4326)::geography");
}

fn push_from_and_filters(qb: &mut QueryBuilder<'static, Postgres>, plan: &QueryPlan) {
    qb.push(" FROM item i");

    if let RankingMode::PreferredCategory { .. } = plan.mode {
        qb.push(" JOIN embedding e ON e.original_id = i.item_id AND e.original_type = '");
        qb.push(OriginalType::Item.as_str());
        qb.push("'");
    }

    qb.push(" WHERE i.is_deleted = FALSE AND i.member_id <> ");
    qb.push_bind(plan.requester_id);
    qb.push(" AND NOT (i.member_id = ANY(");
    qb.push_bind(plan.excluded_owners.clone());
    qb.push("))");

    if let RankingMode::Distance {
        origin,
        radius_meters,
    } = &plan.mode
    {
        qb.push(" AND ST_DWithin(i.location, ");
        push_point(qb, origin);
        qb.push(", ");
        qb.push_bind(*radius_meters);
        qb.push(")");
    }
}

/// `((explicit * ew + implicit * iw) * cw) + exp(-λ * age_days) * fw`
fn push_recommended_score(
    qb: &mut QueryBuilder<'static, Postgres>,
    affinity: &MemberAffinity,
    scoring: &ScoringConfig,
    now: DateTime<Utc>,
) {
    let explicit_codes: Vec<i32> = affinity.explicit.iter().map(|c| c.code()).collect();

    qb.push("(((CASE WHEN i.item_category = ANY(");
    qb.push_bind(explicit_codes);
    qb.push(") THEN 1.0::float8 ELSE 0.0::float8 END) * ");
    qb.push_bind(scoring.explicit_weight);

    qb.push(" + ");
    if affinity.implicit_share.is_empty() {
        qb.push("0.0::float8");
    } else {
        qb.push("(CASE i.item_category");
        for (category, share) in &affinity.implicit_share {
            qb.push(" WHEN ");
            qb.push_bind(category.code());
            qb.push(" THEN ");
            qb.push_bind(*share);
        }
        qb.push(" ELSE 0.0::float8 END)");
    }
    qb.push(" * ");
    qb.push_bind(scoring.implicit_weight);

    qb.push(") * ");
    qb.push_bind(scoring.category_weight);

    qb.push(" + EXP(");
    qb.push_bind(-scoring.time_decay_lambda);
    qb.push(" * GREATEST(0.0::float8, EXTRACT(EPOCH FROM (");
    qb.push_bind(now);
    qb.push(" - i.created_at))::float8 / 86400.0)) * ");
    qb.push_bind(scoring.freshness_weight);
    qb.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemCategory;
    use std::collections::{BTreeMap, BTreeSet};

    fn plan(mode: RankingMode) -> QueryPlan {
        QueryPlan {
            requester_id: Uuid::new_v4(),
            excluded_owners: vec![Uuid::new_v4()],
            mode,
            direction: SortDirection::Asc,
            page_number: 2,
            page_size: 20,
            timeout: Duration::from_secs(3),
        }
    }

    fn request(sort_mode: SortMode) -> RankingRequest {
        RankingRequest {
            requester_id: Uuid::new_v4(),
            origin: None,
            radius_meters: None,
            sort_mode,
            sort_direction: SortDirection::Desc,
            page_number: 0,
            page_size: 20,
            timeout_ms: None,
        }
    }

    fn from_clause(sql: &str) -> &str {
        let start = sql.find(" FROM item i").unwrap();
        let end = sql.find(" ORDER BY").unwrap_or(sql.len());
        &sql[start..end]
    }

    #[test]
    fn test_distance_query_filters_and_orders_geodesically() {
        let plan = plan(RankingMode::Distance {
            origin: GeoPoint::new(127.0276, 37.4979),
            radius_meters: 1000.0,
        });
        let sql = RankedQueryBuilder::page_query(&plan).sql().to_string();

        assert!(sql.contains("ST_Distance(i.location, ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography) AS distance_meters"));
        assert!(sql.contains("ST_DWithin(i.location, ST_SetSRID(ST_MakePoint("));
        assert!(sql.contains("NULL::float8 AS cosine_distance"));
        assert!(sql.contains("ORDER BY distance_meters ASC, i.item_id ASC LIMIT"));
        assert!(!sql.contains("JOIN embedding"));
    }

    #[test]
    fn test_count_query_shares_filters_with_page_query() {
        let modes = vec![
            RankingMode::Distance {
                origin: GeoPoint::new(127.0, 37.5),
                radius_meters: 500.0,
            },
            RankingMode::PreferredCategory {
                preference: EmbeddingVector::basis(3),
            },
            RankingMode::CreatedDate,
        ];

        for mode in modes {
            let plan = plan(mode);
            let page = RankedQueryBuilder::page_query(&plan).sql().to_string();
            let count = RankedQueryBuilder::count_query(&plan).sql().to_string();

            let page_from = renumber(from_clause(&page));
            let count_from = renumber(from_clause(&count));
            assert_eq!(page_from, count_from);
            assert!(count.starts_with("SELECT COUNT(*) FROM item i"));
            assert!(!count.contains("ORDER BY"));
            assert!(!count.contains("LIMIT"));
        }
    }

    /// Placeholder numbers differ between the two statements; compare shapes only
    fn renumber(sql: &str) -> String {
        let mut out = String::new();
        let mut chars = sql.chars().peekable();
        while let Some(c) = chars.next() {
            out.push(c);
            if c == '$' {
                while chars.peek().map_or(false, |d| d.is_ascii_digit()) {
                    chars.next();
                }
            }
        }
        out
    }

    #[test]
    fn test_preferred_category_joins_item_embeddings() {
        let plan = plan(RankingMode::PreferredCategory {
            preference: EmbeddingVector::basis(0),
        });
        let sql = RankedQueryBuilder::page_query(&plan).sql().to_string();

        assert!(sql.contains(
            "JOIN embedding e ON e.original_id = i.item_id AND e.original_type = 'ITEM'"
        ));
        assert!(sql.contains("(e.embedding <=> $1::text::vector)::float8 AS cosine_distance"));
        assert!(sql.contains("ORDER BY cosine_distance ASC"));
    }

    #[test]
    fn test_created_date_has_baseline_filters_only() {
        let mut plan = plan(RankingMode::CreatedDate);
        plan.direction = SortDirection::Desc;
        let sql = RankedQueryBuilder::page_query(&plan).sql().to_string();

        assert!(sql.contains("WHERE i.is_deleted = FALSE AND i.member_id <> $1 AND NOT (i.member_id = ANY($2))"));
        assert!(sql.contains("ORDER BY i.created_at DESC, i.item_id ASC LIMIT $3 OFFSET $4"));
        assert!(!sql.contains("ST_DWithin"));
    }

    #[test]
    fn test_recommended_score_expression() {
        let plan = plan(RankingMode::Recommended {
            affinity: MemberAffinity {
                explicit: BTreeSet::from([ItemCategory::Shoes]),
                implicit_share: BTreeMap::from([
                    (ItemCategory::Shoes, 0.25),
                    (ItemCategory::Watches, 0.75),
                ]),
            },
            scoring: ScoringConfig::default(),
            now: Utc::now(),
        });
        let sql = RankedQueryBuilder::page_query(&plan).sql().to_string();

        assert!(sql.contains("CASE WHEN i.item_category = ANY($1)"));
        assert!(sql.contains("(CASE i.item_category WHEN $3 THEN $4 WHEN $5 THEN $6 ELSE 0.0::float8 END)"));
        assert!(sql.contains("EXP($9 * GREATEST(0.0::float8, EXTRACT(EPOCH FROM ($10 - i.created_at))::float8 / 86400.0))"));
        assert!(sql.contains("AS score FROM item i"));
        assert!(sql.contains("ORDER BY score ASC, i.item_id ASC"));
    }

    #[test]
    fn test_offset_is_page_times_size() {
        let plan = plan(RankingMode::CreatedDate);
        assert_eq!(plan.limit(), 20);
        assert_eq!(plan.offset(), 40);
    }

    #[test]
    fn test_distance_without_origin_is_invalid() {
        let limits = DiscoveryConfig::default();

        let mut req = request(SortMode::Distance);
        req.radius_meters = Some(1000.0);
        assert!(matches!(
            RankedQueryBuilder::validate(&req, &limits),
            Err(DiscoveryError::InvalidRankingRequest(_))
        ));

        req.origin = Some(GeoPoint::new(127.0, 37.5));
        req.radius_meters = None;
        assert!(matches!(
            RankedQueryBuilder::validate(&req, &limits),
            Err(DiscoveryError::InvalidRankingRequest(_))
        ));

        req.radius_meters = Some(-5.0);
        assert!(RankedQueryBuilder::validate(&req, &limits).is_err());

        req.radius_meters = Some(1000.0);
        assert!(RankedQueryBuilder::validate(&req, &limits).is_ok());
    }

    #[test]
    fn test_page_size_bounds() {
        let limits = DiscoveryConfig::default();
        let mut req = request(SortMode::CreatedDate);

        req.page_size = 0;
        assert!(RankedQueryBuilder::validate(&req, &limits).is_err());
        req.page_size = limits.max_page_size + 1;
        assert!(RankedQueryBuilder::validate(&req, &limits).is_err());
        req.page_size = limits.max_page_size;
        assert!(RankedQueryBuilder::validate(&req, &limits).is_ok());
    }

    #[test]
    fn test_caller_timeout_is_capped() {
        let limits = DiscoveryConfig::default();
        let mut req = request(SortMode::CreatedDate);

        assert_eq!(
            RankedQueryBuilder::validate(&req, &limits).unwrap(),
            Duration::from_millis(3000)
        );

        req.timeout_ms = Some(250);
        assert_eq!(
            RankedQueryBuilder::validate(&req, &limits).unwrap(),
            Duration::from_millis(250)
        );

        req.timeout_ms = Some(60_000);
        assert_eq!(
            RankedQueryBuilder::validate(&req, &limits).unwrap(),
            Duration::from_millis(3000)
        );

        req.timeout_ms = Some(0);
        assert!(RankedQueryBuilder::validate(&req, &limits).is_err());
    }
}
