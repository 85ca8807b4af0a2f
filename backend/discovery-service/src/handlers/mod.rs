pub mod discovery;
pub mod health;
pub mod interactions;
pub mod preferences;

use actix_web::web;

pub use discovery::{discover_items, get_item_score};
pub use health::{liveness, readiness};
pub use interactions::record_interaction;
pub use preferences::save_preferred_categories;

/// Register the API routes (everything except readiness, which needs the pool)
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(liveness)
        .service(discover_items)
        .service(get_item_score)
        .service(record_interaction)
        .service(save_preferred_categories)
        .route("/metrics", web::get().to(crate::metrics::serve_metrics));
}
