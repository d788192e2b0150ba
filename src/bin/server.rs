//! crew-graph HTTP server binary.
//!
//! # Environment Variables
//!
//! - `PORT`: HTTP port (default: 8080)
//! - `OPENROUTER_API_KEY` / `OPENAI_API_KEY`: gateway credentials
//! - `CREW_*`: engine, model and tool settings
//! - `RUST_LOG`: Tracing filter (default: "info,crew_graph=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use crew_graph::server::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crew_graph=debug".into()),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);

    let state = AppState::new();
    if state.llm_config.api_key.is_none() {
        tracing::warn!("No OPENROUTER_API_KEY or OPENAI_API_KEY set; model calls will fail");
    }
    let app = app_router(state);

    tracing::info!("crew-graph server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health   liveness probe");
    tracing::info!("  POST /execute  run a prompt against a crew");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
