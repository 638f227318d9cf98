use clap::Parser;
use r2d2::Pool;
use std::sync::Arc;
use tracing::{error, info, warn};

mod analyze;
mod config;
mod dashboard;
mod db;
mod llm;
mod util;
mod viz;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::db::db_pool::DuckDBConnectionManager;
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Connecting to warehouse at {}",
        config.database.connection_string
    );
    let db_manager = DuckDBConnectionManager::new(config.database.connection_string.clone());
    let pool = Pool::builder()
        .max_size(config.database.pool_size as u32)
        .build(db_manager)?;

    // Initialize LLM manager
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    // Create application state
    let app_state = Arc::new(AppState::new(config.clone(), pool, llm_manager));

    // Warm the schema context so the first question doesn't pay for it
    if let Err(e) = app_state.schema_manager.refresh().await {
        warn!("Failed to build initial schema context: {}", e);
        // Continue anyway, it will be rebuilt on demand
    }

    // Start the web server
    info!(
        "Starting nl-dash server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(std::io::Error::other(e.to_string()).into());
        }
    }

    Ok(())
}
