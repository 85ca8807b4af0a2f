use actix_web::{post, web, HttpResponse};
use tracing::debug;

use crate::models::InteractionEvent;
use crate::services::DiscoveryService;

/// POST /api/v1/interactions
///
/// Fire-and-forget: the score update runs in the background and the caller
/// gets 202 straight away, whatever the store does.
#[post("/api/v1/interactions")]
pub async fn record_interaction(
    body: web::Json<InteractionEvent>,
    service: web::Data<DiscoveryService>,
) -> HttpResponse {
    let event = body.into_inner();
    debug!(
        member_id = %event.member_id,
        category = %event.item_category,
        interaction_type = %event.interaction_type,
        "Interaction event received"
    );

    let tracker = service.tracker().clone();
    tokio::spawn(async move {
        tracker.ingest(event).await;
    });

    HttpResponse::Accepted().json(serde_json::json!({ "status": "accepted" }))
}
