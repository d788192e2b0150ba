//! Axum route handlers for the crew-graph HTTP server.
//!
//! # Routes
//!
//! - `GET  /health` : Returns `{"status": "ok", "version": ..., "service": "crew-graph"}`
//! - `POST /execute`: Runs a prompt against the crew in the request body

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::crew::{Crew, CrewSpec};
use crate::graph::config::GraphConfig;
use crate::llm::LLMConfig;
use crate::tools::tool_set::ToolConfig;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub llm_config: Arc<LLMConfig>,
    pub tool_config: Arc<ToolConfig>,
    pub graph_config: Arc<GraphConfig>,
}

impl AppState {
    /// Settings read from the environment.
    pub fn new() -> Self {
        Self::with_configs(LLMConfig::from_env(), ToolConfig::from_env(), GraphConfig::from_env())
    }

    pub fn with_configs(llm: LLMConfig, tools: ToolConfig, graph: GraphConfig) -> Self {
        Self {
            llm_config: Arc::new(llm),
            tool_config: Arc::new(tools),
            graph_config: Arc::new(graph),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub crew: CrewSpec,
    pub prompt: String,
    /// Caller's conversation id; only used to correlate logs.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/execute", post(execute_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health: liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "crew-graph",
    }))
}

/// POST /execute: run a prompt.
///
/// 200 with the `CrewOutput` on success, 400 when the crew definition is
/// unusable, 500 with the `CrewOutput` (partial transcript included) when
/// the run failed.
async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Response {
    tracing::info!(
        crew = %request.crew.name,
        session = request.session_id.as_deref().unwrap_or("-"),
        "execute request"
    );

    let crew = Crew {
        spec: request.crew,
        llm_config: (*state.llm_config).clone(),
        tool_config: (*state.tool_config).clone(),
        graph_config: (*state.graph_config).clone(),
    };

    match crew.execute_prompt(&request.prompt).await {
        Ok(output) if output.error.is_some() => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(output)).into_response()
        }
        Ok(output) => (StatusCode::OK, Json(output)).into_response(),
        Err(e) => {
            let status = if e.is_configuration() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            tracing::warn!("execute request rejected: {}", e);
            (status, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}
