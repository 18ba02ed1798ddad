use actix_web::{get, web, HttpRequest, HttpResponse};
use log::debug;

use malti_core::Permission;

use crate::auth::authenticate;
use crate::dto::{AggregateParams, RealtimeParams};
use crate::error::AppError;
use crate::server::AppState;

/// Configure metrics routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(aggregate).service(aggregate_realtime);
}

/// GET /api/v1/metrics/aggregate - Pre-aggregated dashboard metrics
#[get("/metrics/aggregate")]
pub async fn aggregate(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    params: web::Query<AggregateParams>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &app_state.credentials, Permission::Metrics)?;

    let query = params.into_inner().into_query()?;
    debug!("aggregate query: {:?}", query);
    let response = app_state.assembler.dashboard_metrics(query).await?;

    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/v1/metrics/aggregate/realtime - Minute-resolution metrics over
/// raw events, window capped at one hour
#[get("/metrics/aggregate/realtime")]
pub async fn aggregate_realtime(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    params: web::Query<RealtimeParams>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &app_state.credentials, Permission::Metrics)?;

    let query = params.into_inner().into_query();
    debug!("realtime query: {:?}", query);
    let response = app_state.assembler.realtime_metrics(query).await?;

    Ok(HttpResponse::Ok().json(response))
}
