use actix_web::{post, web, HttpRequest, HttpResponse};
use log::info;

use malti_core::{validate_batch, Permission};

use crate::auth::authenticate;
use crate::dto::{IngestResponse, TelemetryBatch};
use crate::error::AppError;
use crate::server::AppState;

/// Configure ingest routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(ingest);
}

/// POST /api/v1/ingest - Accept a telemetry batch from a service
#[post("/ingest")]
pub async fn ingest(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    body: web::Json<TelemetryBatch>,
) -> Result<HttpResponse, AppError> {
    let identity = authenticate(&req, &app_state.credentials, Permission::Ingest)?;

    // The caller may only submit telemetry attributed to itself; the batch is
    // sanitized and checked as a whole before anything is written.
    let records = validate_batch(body.into_inner().requests, &identity.name)?;
    let count = app_state.store.insert_batch(records).await?;

    info!(
        "ingested {} records from service '{}'",
        count, identity.name
    );

    Ok(HttpResponse::Ok().json(IngestResponse {
        message: "Telemetry ingested".to_string(),
        count,
        service: identity.name,
    }))
}
