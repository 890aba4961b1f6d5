//! Sync and health routes

use axum::{extract::State, routing::get, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::error::MorduResult;
use crate::remote::RemoteCounts;
use crate::sync::{SyncResults, SyncStatus};

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<SyncResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: SyncStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StorageHealth {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub local: &'static str,
    pub mongodb: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SyncHealth {
    pub active: bool,
    #[serde(rename = "mongoState")]
    pub mongo_state: u8,
    #[serde(rename = "connectionAttempts")]
    pub connection_attempts: u32,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub storage: StorageHealth,
    pub sync: SyncHealth,
    pub version: &'static str,
    pub environment: String,
}

pub fn sync_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync", post(manual_sync))
        .route("/sync/status", get(sync_status))
        .route("/sync/remote", get(remote_counts))
        .route("/health", get(health))
}

/// Run a sync cycle now and report per-collection counts
async fn manual_sync(State(state): State<Arc<AppState>>) -> Json<SyncResponse> {
    info!("Manual sync requested");
    let outcome = state.engine.manual_sync().await;
    let message = if outcome.success {
        "Sync completed"
    } else {
        "Sync not possible"
    };
    Json(SyncResponse {
        success: outcome.success,
        message: message.to_string(),
        results: outcome.results,
        reason: outcome.reason,
        timestamp: Utc::now(),
    })
}

async fn sync_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.engine.status().await,
        timestamp: Utc::now(),
    })
}

async fn remote_counts(State(state): State<Arc<AppState>>) -> MorduResult<Json<RemoteCounts>> {
    Ok(Json(state.engine.remote_counts().await?))
}

/// Liveness. The local store is always reported connected: the server does
/// not start without it.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = state.engine.status().await;
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
        storage: StorageHealth {
            kind: "hybrid",
            local: "connected",
            mongodb: if status.is_connected {
                "connected"
            } else {
                "disconnected"
            },
        },
        sync: SyncHealth {
            active: status.sync_active,
            mongo_state: status.mongo_state,
            connection_attempts: status.connection_attempts,
        },
        version: env!("CARGO_PKG_VERSION"),
        environment: state.environment.clone(),
    })
}
