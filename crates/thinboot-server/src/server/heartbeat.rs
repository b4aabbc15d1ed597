//! Liveness endpoint.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use thinboot_core::db::unix_timestamp;
use tracing::{instrument, warn};

use super::{AppState, ApiError, ClientIp, parse_mac};
use crate::storage::ClientStatus;

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub success: bool,
    pub status: ClientStatus,
    pub last_seen: Option<i64>,
}

/// `GET|POST /heartbeat/{mac}`: mark an active client online.
#[instrument(skip(state), fields(ip = %ip))]
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(mac): Path<String>,
    ClientIp(ip): ClientIp,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let mac = parse_mac(&mac)?;
    let Some(client) = state
        .liveness
        .heartbeat(&mac, &ip, unix_timestamp())
        .await?
    else {
        warn!(mac = %mac, "Heartbeat from unknown or inactive client");
        return Err(ApiError::ClientNotFound);
    };

    Ok(Json(HeartbeatResponse {
        success: true,
        status: client.status,
        last_seen: client.last_seen,
    }))
}
