use actix_web::{get, web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::auth::identify;
use crate::dto::AuthTestResponse;
use crate::error::AppError;
use crate::server::AppState;

/// Configure auth routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(auth_test);
}

/// GET /api/v1/auth/test - Echo the identity a key resolves to, plus the
/// dashboard thresholds. Any valid key passes; no permission is required.
#[get("/auth/test")]
pub async fn auth_test(
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = identify(&req, &app_state.credentials)?;
    let dashboard_thresholds = app_state.credentials.dashboard_thresholds();

    Ok(HttpResponse::Ok().json(AuthTestResponse {
        authenticated: true,
        user,
        timestamp: Utc::now(),
        dashboard_thresholds,
    }))
}
