use actix_web::{get, web, HttpResponse, Responder};

use crate::dto::HealthResponse;

/// Configure system routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
}

/// GET /health - Liveness probe, unauthenticated
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse { status: "healthy" })
}
