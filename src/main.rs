// Main entry point for the ai-editor-server application.
// Loads configuration, builds the inference client, configures the Axum
// router, and starts the HTTP server.

mod config;
mod inference;
mod shutdown_signal;
mod web;

use clap::Parser;
use config::AppConfig;
use inference::{ReplicateClient, SharedImageEditor};
use shutdown_signal::shutdown_signal;
use std::sync::Arc;
use tracing::Level;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; real environment variables still apply
    let dotenv_result = dotenvy::dotenv();

    // Parse command line args and environment variables
    let config = AppConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(if config.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting ai-editor-server...");
    match dotenv_result {
        Ok(path) => tracing::info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Failed to load .env file: {}", e),
    }

    // --- Initialize the inference client ---
    let replicate_config = config.replicate_config().unwrap_or_else(|err| {
        tracing::error!("FATAL: Invalid inference configuration: {}", err);
        std::process::exit(1);
    });
    tracing::info!(
        "Using model {} at {}",
        replicate_config.model,
        replicate_config.base_url
    );

    let editor: SharedImageEditor = match ReplicateClient::new(replicate_config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            tracing::error!("FATAL: Failed to initialize inference client: {}", err);
            std::process::exit(1);
        }
    };

    let app = web::create_app(editor, config.max_upload_bytes);
    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match web::create_listener(&config.host, config.port).await {
        Ok((addr, listener)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            listener
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
    }

    tracing::info!("ai-editor-server has shut down.");
}
