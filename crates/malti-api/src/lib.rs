pub mod auth;
pub mod config;
pub mod controllers;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod server;

pub use config::{load_server_config, ServerConfig};
pub use error::{AppError, Result};
pub use server::{app_config, run, AppState};
