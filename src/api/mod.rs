//! HTTP control API.
//!
//! | Route | Body |
//! |---|---|
//! | `POST /start-game-server` | `{"placeId": .., "year": ..}` |
//! | `POST /kill-game-server` | `{"jobId": ..}` |
//! | `POST /evict-player` | `{"userId": .., "gameId": ..}` |
//! | `GET /active-games` | |
//!
//! Every route sits behind [`auth::require_auth`].

pub mod auth;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::arbiter::ArbiterService;
use crate::error::ArbiterError;

#[derive(Clone)]
pub struct ApiState {
    pub arbiter: Arc<ArbiterService>,
    pub auth_key: Arc<str>,
}

impl ApiState {
    pub fn new(arbiter: Arc<ArbiterService>, auth_key: impl Into<Arc<str>>) -> Self {
        Self {
            arbiter,
            auth_key: auth_key.into(),
        }
    }
}

/// Identifiers arrive as JSON strings or numbers depending on the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Text(String),
    Number(serde_json::Number),
}

impl IdValue {
    /// Years arrive as `2011` or `"2011"`.
    fn as_variant(&self) -> Option<u32> {
        match self {
            IdValue::Text(s) => s.trim().parse().ok(),
            IdValue::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        }
    }
}

impl std::fmt::Display for IdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdValue::Text(s) => write!(f, "{}", s),
            IdValue::Number(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    place_id: Option<IdValue>,
    year: Option<IdValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KillRequest {
    job_id: Option<IdValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvictRequest {
    user_id: Option<IdValue>,
    game_id: Option<IdValue>,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ArbiterError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ArbiterError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ArbiterError::InvalidVariant(_) => (StatusCode::BAD_REQUEST, "Invalid year".to_string()),
            ArbiterError::NotFound(_) => (StatusCode::NOT_FOUND, "Server not found".to_string()),
            ArbiterError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ArbiterError::PortsExhausted => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ArbiterError::SpawnFailure { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<JsonRejection> for ArbiterError {
    fn from(rejection: JsonRejection) -> Self {
        ArbiterError::InvalidRequest(rejection.body_text())
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/start-game-server", post(start_handler))
        .route("/kill-game-server", post(kill_handler))
        .route("/evict-player", post(evict_handler))
        .route("/active-games", get(list_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .layer(cors)
        .with_state(state)
}

/// Serve the control API until `shutdown` is cancelled.
pub async fn run_api(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Game Arbiter listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn start_handler(
    State(state): State<ApiState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Response, ArbiterError> {
    let Json(payload) = payload?;
    let year = payload
        .year
        .as_ref()
        .and_then(IdValue::as_variant)
        .ok_or_else(|| ArbiterError::InvalidRequest("Invalid year".to_string()))?;
    let place_id = payload
        .place_id
        .ok_or_else(|| ArbiterError::InvalidRequest("Missing placeId".to_string()))?;

    let started = state
        .arbiter
        .start_game_server(place_id.to_string(), year)
        .await?;
    Ok(Json(started).into_response())
}

async fn kill_handler(
    State(state): State<ApiState>,
    payload: Result<Json<KillRequest>, JsonRejection>,
) -> Result<Response, ArbiterError> {
    let Json(payload) = payload?;
    // A missing id or one that is not a UUID cannot name a running server
    let job_id = payload
        .job_id
        .and_then(|id| Uuid::parse_str(&id.to_string()).ok())
        .ok_or(ArbiterError::NotFound(Uuid::nil()))?;
    state.arbiter.kill_game_server(job_id).await?;
    Ok(Json(SuccessResponse { success: true }).into_response())
}

async fn evict_handler(
    State(state): State<ApiState>,
    payload: Result<Json<EvictRequest>, JsonRejection>,
) -> Result<Response, ArbiterError> {
    let Json(payload) = payload?;
    let user_id = payload.user_id.map(|id| id.to_string()).unwrap_or_default();
    let game_id = payload.game_id.map(|id| id.to_string()).unwrap_or_default();
    state.arbiter.evict_player(&user_id, &game_id)?;
    Ok(Json(SuccessResponse { success: true }).into_response())
}

async fn list_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.arbiter.list_active_games().await)
}
