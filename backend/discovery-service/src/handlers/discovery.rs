//! Discovery API Handlers
//!
//! Ranked listing pages and per-listing score breakdowns

use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DiscoveryError, Result};
use crate::models::{GeoPoint, RankingRequest, SortDirection, SortMode};
use crate::services::DiscoveryService;

/// Query parameters for GET /api/v1/items/discover
#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    pub requester_id: Uuid,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub radius_meters: Option<f64>,
    pub sort_mode: SortMode,
    #[serde(default)]
    pub sort_direction: SortDirection,
    /// Zero-based (default: 0)
    #[serde(default)]
    pub page_number: u32,
    /// Default: 20
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub timeout_ms: Option<u64>,
}

fn default_page_size() -> u32 {
    20
}

impl DiscoverQuery {
    pub fn into_request(self) -> Result<RankingRequest> {
        let origin = match (self.longitude, self.latitude) {
            (Some(longitude), Some(latitude)) => Some(GeoPoint::new(longitude, latitude)),
            (None, None) => None,
            _ => {
                return Err(DiscoveryError::InvalidRankingRequest(
                    "longitude and latitude must be given together".to_string(),
                ))
            }
        };

        Ok(RankingRequest {
            requester_id: self.requester_id,
            origin,
            radius_meters: self.radius_meters,
            sort_mode: self.sort_mode,
            sort_direction: self.sort_direction,
            page_number: self.page_number,
            page_size: self.page_size,
            timeout_ms: self.timeout_ms,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ScoreQuery {
    pub member_id: Uuid,
}

/// GET /api/v1/items/discover
///
/// One page of listings ranked by the requested sort mode, with the exact total
#[get("/api/v1/items/discover")]
pub async fn discover_items(
    query: web::Query<DiscoverQuery>,
    service: web::Data<DiscoveryService>,
) -> Result<HttpResponse> {
    let request = query.into_inner().into_request()?;
    debug!(
        requester_id = %request.requester_id,
        sort_mode = %request.sort_mode,
        page_number = request.page_number,
        page_size = request.page_size,
        "Discovery request"
    );

    let page = service.discover(request).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/v1/items/{item_id}/score?member_id=
#[get("/api/v1/items/{item_id}/score")]
pub async fn get_item_score(
    path: web::Path<Uuid>,
    query: web::Query<ScoreQuery>,
    service: web::Data<DiscoveryService>,
) -> Result<HttpResponse> {
    let breakdown = service
        .score_breakdown(path.into_inner(), query.member_id)
        .await?;
    Ok(HttpResponse::Ok().json(breakdown))
}
