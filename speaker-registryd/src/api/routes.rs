use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::{mpsc, watch};
use shared::types::{Command, CommandAction, DeviceEntry};
use crate::control::models::PlayInfoResponse;
use crate::control::{ControlClient, ControlEndpoint};
use crate::registry::RegistrySnapshot;

#[derive(Clone)]
pub struct AppState {
    pub snapshots: watch::Receiver<Arc<RegistrySnapshot>>,
    pub commands: mpsc::Sender<Command>,
    pub control: ControlClient,
}

impl AppState {
    fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshots.borrow().clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/devices", get(get_devices))
        .route("/v1/devices/hash", get(get_hash))
        .route("/v1/devices/:id", get(get_device))
        .route("/v1/devices/:id/playing", get(get_playing))
        .route("/v1/devices/:id/commands", post(post_command))
        .with_state(state)
}

async fn get_devices(State(state): State<AppState>) -> Json<Vec<DeviceEntry>> {
    Json(state.snapshot().devices.clone())
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.snapshot().hash.clone()
}

async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceEntry>, StatusCode> {
    state
        .snapshot()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_playing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlayInfoResponse>, StatusCode> {
    let snapshot = state.snapshot();
    let device = &snapshot.get(&id).ok_or(StatusCode::NOT_FOUND)?.device;

    let endpoint = ControlEndpoint::from_device(device).map_err(|e| {
        tracing::warn!("Bad control endpoint for {}: {}", id, e);
        StatusCode::BAD_GATEWAY
    })?;
    state
        .control
        .get_play_info(&endpoint)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::warn!("Failed to fetch play info for {}: {}", id, e);
            StatusCode::BAD_GATEWAY
        })
}

async fn post_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(action): Json<CommandAction>,
) -> StatusCode {
    if state.snapshot().get(&id).is_none() {
        return StatusCode::NOT_FOUND;
    }

    let command = Command {
        device_id: id,
        action,
    };
    match state.commands.try_send(command) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::warn!("Command queue unavailable: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
