use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use log::{error, info};

use malti_core::{CredentialCache, DashboardAssembler, SqliteTelemetryStore, TelemetryStore};

use crate::config::ServerConfig;
use crate::controllers::{
    auth_controller, ingest_controller, metrics_controller, system_controller,
};
use crate::middleware::TracingMiddleware;

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub store: Arc<dyn TelemetryStore>,
    pub credentials: Arc<CredentialCache>,
    pub assembler: DashboardAssembler,
}

impl AppState {
    pub fn new(store: Arc<dyn TelemetryStore>, credentials: Arc<CredentialCache>) -> Self {
        let assembler = DashboardAssembler::new(Arc::clone(&store));
        Self {
            store,
            credentials,
            assembler,
        }
    }
}

/// Route table: the health probe at the root, everything else under
/// `/api/v1`.
pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.configure(system_controller::config).service(
        web::scope("/api/v1")
            .configure(ingest_controller::config)
            .configure(metrics_controller::config)
            .configure(auth_controller::config),
    );
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    info!("Starting Malti API server...");

    let store: Arc<dyn TelemetryStore> = Arc::new(SqliteTelemetryStore::new(&config.db_path));
    store.init().await?;
    info!("telemetry store ready at {}", config.db_path.display());

    let credentials = Arc::new(CredentialCache::new(&config.credentials_path));
    let (services, users) = credentials.stats();
    info!("credential cache ready: {services} services, {users} users");

    let app_state = web::Data::new(AppState::new(store, credentials));

    let bind_addr = format!("{}:{}", config.host, config.port);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(TracingMiddleware)
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .workers(config.workers)
    .bind(&bind_addr)?
    .run();

    info!("Malti API listening on http://{bind_addr}");

    if let Err(e) = server.await {
        error!("Web server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
