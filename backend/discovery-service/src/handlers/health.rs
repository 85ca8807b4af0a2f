use actix_web::{get, web, HttpResponse};
use sqlx::PgPool;
use tracing::warn;

/// GET /health (liveness)
#[get("/health")]
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// GET /health/ready: the database answers `SELECT 1`
#[get("/health/ready")]
pub async fn readiness(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "status": "ready" })),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable()
                .json(serde_json::json!({ "status": "unavailable" }))
        }
    }
}
