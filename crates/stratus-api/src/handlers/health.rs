use actix_web::{get, HttpResponse, Responder};
use serde_json::json;

/// GET /health - liveness probe.
#[get("/health")]
pub async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "stratus",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
