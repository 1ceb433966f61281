use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use super::api::{self, AppState};
use crate::config::{AppConfig, Credentials};
use crate::llm::GeminiClient;
use crate::pipeline::{PipelineController, ProgressRegistry, RunScheduler};

/// Build the application router, optionally wrapped in a permissive CORS layer.
pub fn build_router(state: Arc<AppState>, cors: bool) -> Router {
    let app = api::api_router().with_state(state);
    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Assemble the production state: Gemini for generation, GitHub for
/// hosting, and a scheduler bounded by `max_concurrent_runs`.
pub fn build_state(config: &AppConfig, credentials: &Credentials) -> Arc<AppState> {
    let client = Arc::new(GeminiClient::new(&config.model, &credentials.gemini_api_key));
    let controller = Arc::new(PipelineController::from_config(config, credentials, client));
    let registry = Arc::new(ProgressRegistry::from_config(&config.server));
    Arc::new(AppState {
        scheduler: RunScheduler::new(controller, registry, config.server.max_concurrent_runs),
        github_configured: !credentials.github_token.is_empty(),
        gemini_configured: !credentials.gemini_api_key.is_empty(),
    })
}

/// Start the HTTP service and run until Ctrl+C.
pub async fn start_server(config: AppConfig, credentials: Credentials) -> Result<()> {
    std::fs::create_dir_all(&config.workspace).with_context(|| {
        format!(
            "Failed to create workspace directory {}",
            config.workspace.display()
        )
    })?;

    let state = build_state(&config, &credentials);
    let app = build_router(state, config.server.cors);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        workspace = %config.workspace.display(),
        max_concurrent_runs = config.server.max_concurrent_runs,
        "autoship listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
