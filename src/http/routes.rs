//! HTTP surface: health, guest tokens, profile reads, queue admin.

use axum::extract::{Path, State};
use axum::http::{self, header, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::Auth;
use crate::game::engine::Engine;
use crate::matchmaking::QUEUE_ENTRY_MAX_AGE;
use crate::store::{DataStore, Profile, StoreError};
use crate::ws;

pub struct AppState<S> {
    pub engine: Engine<S>,
    pub auth: Auth,
}

impl<S: Clone> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone(), auth: self.auth.clone() }
    }
}

pub fn app<S: DataStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/auth/guest", post(guest_login::<S>))
        .route("/api/profile/:id", get(get_profile::<S>))
        .route("/api/leaderboard", get(leaderboard::<S>))
        .route("/api/matchmaking/status", get(queue_status::<S>))
        .route("/api/matchmaking/cleanup", delete(queue_cleanup::<S>))
        .route("/ws", get(ws::connection::ws_handler::<S>))
        .layer(
            CorsLayer::new()
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct GuestLoginRequest {
    username: String,
}

#[derive(Debug, Serialize)]
struct GuestLoginResponse {
    token: String,
    user_id: Uuid,
}

/// Issue a signed token for a fresh guest identity.
async fn guest_login<S: DataStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<GuestLoginRequest>,
) -> Result<Json<GuestLoginResponse>, (StatusCode, String)> {
    let username = req.username.trim();
    if username.is_empty() || username.len() > 24 {
        return Err((StatusCode::BAD_REQUEST, "username must be 1-24 characters".into()));
    }
    let user_id = Uuid::new_v4();
    state
        .engine
        .store()
        .ensure_profile(user_id, username)
        .await
        .map_err(internal_error)?;
    let token = state.auth.issue(user_id, username).map_err(internal_error)?;
    Ok(Json(GuestLoginResponse { token, user_id }))
}

async fn get_profile<S: DataStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Profile>, (StatusCode, String)> {
    match state.engine.store().fetch_profile(id).await {
        Ok(profile) => Ok(Json(profile)),
        Err(StoreError::ProfileNotFound(_)) => {
            Err((StatusCode::NOT_FOUND, "profile not found".into()))
        }
        Err(err) => Err(internal_error(err)),
    }
}

async fn leaderboard<S: DataStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<Profile>>, (StatusCode, String)> {
    let top = state.engine.store().leaderboard(100).await.map_err(internal_error)?;
    Ok(Json(top))
}

#[derive(Debug, Serialize)]
struct QueueStatusResponse {
    players_in_queue: usize,
}

async fn queue_status<S: DataStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<QueueStatusResponse>, (StatusCode, String)> {
    let players_in_queue = state.engine.store().queue_len().await.map_err(internal_error)?;
    Ok(Json(QueueStatusResponse { players_in_queue }))
}

#[derive(Debug, Serialize)]
struct QueueCleanupResponse {
    removed: usize,
}

/// Drop queue entries older than the stale cutoff.
async fn queue_cleanup<S: DataStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<QueueCleanupResponse>, (StatusCode, String)> {
    let removed = state
        .engine
        .store()
        .sweep_stale_queue(QUEUE_ENTRY_MAX_AGE)
        .await
        .map_err(internal_error)?;
    Ok(Json(QueueCleanupResponse { removed }))
}
