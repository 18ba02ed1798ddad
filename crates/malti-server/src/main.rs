use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .with_file(false),
        )
        .init();

    let config = malti_api::load_server_config();
    tracing::info!(
        "Starting Malti on {}:{} (db: {}, credentials: {})",
        config.host,
        config.port,
        config.db_path.display(),
        config.credentials_path.display()
    );

    if let Err(e) = malti_api::run(config).await {
        tracing::error!("Failed to run Malti server: {}", e);
        std::process::exit(1);
    }
}
