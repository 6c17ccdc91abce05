//! JSON API over the scoring engine.
//!
//! | Method | Path                               | Result                                 |
//! |--------|------------------------------------|----------------------------------------|
//! | GET    | `/api/health`                      | liveness and version                   |
//! | POST   | `/api/sessions/:session/analysis`  | runs an analysis, returns the population |
//! | GET    | `/api/sessions/:session/analysis`  | whether the session has a run in flight |
//! | DELETE | `/api/sessions/:session/analysis`  | cancels the session's run (204 / 404)  |

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    engine::{ScoringEngine, SessionId},
    error::AnalysisError,
    factors::AnalysisParameters,
    population::ScoredPopulation,
    spatial::Region,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<ScoringEngine>,
}

pub struct WebServerConfig {
    pub engine: ScoringEngine,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub region: Region,
    #[serde(default)]
    pub parameters: AnalysisParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session: SessionId,
    pub running: bool,
}

pub fn router(engine: Arc<ScoringEngine>) -> Router {
    let state = Arc::new(AppState { engine });
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/sessions/:session/analysis",
            get(session_status).post(start_analysis).delete(cancel_analysis),
        )
        .with_state(state)
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig { engine, host, port } = config;
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;

    let router = router(Arc::new(engine));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "canopy API listening (Ctrl+C to stop)");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down API");
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let status = match &err {
            AnalysisError::InvalidRegion(_)
            | AnalysisError::InvalidParameters(_)
            | AnalysisError::GridTooDense { .. } => StatusCode::BAD_REQUEST,
            AnalysisError::SessionBusy(_) => StatusCode::CONFLICT,
            AnalysisError::Cancelled => StatusCode::GONE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Json<SessionStatus> {
    let session = SessionId::new(session);
    Json(SessionStatus {
        running: state.engine.is_busy(&session),
        session,
    })
}

/// Dropping the request (client disconnect) drops the handle, which cancels the run.
async fn start_analysis(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<ScoredPopulation>, ApiError> {
    let handle = state
        .engine
        .spawn_analysis(session.as_str(), request.region, request.parameters)
        .map_err(|err| {
            warn!(%session, %err, "analysis rejected");
            ApiError::from(err)
        })?;
    let population = handle.outcome().await?;
    Ok(Json(population))
}

async fn cancel_analysis(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> StatusCode {
    if state.engine.cancel(&SessionId::new(session)) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
