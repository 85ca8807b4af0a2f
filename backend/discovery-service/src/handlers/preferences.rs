use actix_web::{put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::models::ItemCategory;
use crate::services::DiscoveryService;

#[derive(Debug, Deserialize)]
pub struct PreferredCategoriesRequest {
    pub categories: Vec<ItemCategory>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreferredCategoriesResponse {
    pub member_id: Uuid,
    pub categories: Vec<ItemCategory>,
    pub embedding_synthesized: bool,
}

/// PUT /api/v1/members/{member_id}/preferred-categories
///
/// Replaces the explicit selection and re-synthesizes the preference embedding.
#[put("/api/v1/members/{member_id}/preferred-categories")]
pub async fn save_preferred_categories(
    path: web::Path<Uuid>,
    body: web::Json<PreferredCategoriesRequest>,
    service: web::Data<DiscoveryService>,
) -> Result<HttpResponse> {
    let member_id = path.into_inner();
    let categories: HashSet<ItemCategory> = body.into_inner().categories.into_iter().collect();

    let saved = service
        .save_preferred_categories(member_id, categories)
        .await?;

    let mut categories: Vec<ItemCategory> = saved.categories.into_iter().collect();
    categories.sort();

    Ok(HttpResponse::Ok().json(PreferredCategoriesResponse {
        member_id: saved.member_id,
        categories,
        embedding_synthesized: saved.embedding_synthesized,
    }))
}
