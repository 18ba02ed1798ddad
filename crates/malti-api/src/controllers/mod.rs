pub mod auth_controller;
pub mod ingest_controller;
pub mod metrics_controller;
pub mod system_controller;
