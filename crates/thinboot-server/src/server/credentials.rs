//! One-time credential redemption.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use thinboot_core::db::unix_timestamp;
use thinboot_crypto::log_prefix;
use tracing::{error, info, instrument, warn};

use super::{AppState, ApiError, ClientIp};
use crate::storage::AuditAction;
use crate::tokens::TokenCheck;

/// Body returned to a booted device.
#[derive(Debug, Serialize)]
pub struct CredentialsResponse {
    pub rdp_server: String,
    pub rdp_domain: String,
    pub rdp_username: String,
    pub rdp_password: String,
}

/// `GET /credentials/{token}`.
///
/// The secret is opened before the token is consumed so a storage or key
/// failure leaves the device able to retry. Consumption is a compare-and-swap:
/// of two concurrent redeemers only one gets the body, the other sees 404.
#[instrument(skip_all, fields(token = %log_prefix(&token), ip = %ip))]
pub async fn redeem(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ClientIp(ip): ClientIp,
) -> Result<Json<CredentialsResponse>, ApiError> {
    let client = match state.tokens.validate(&token, unix_timestamp()).await? {
        TokenCheck::Valid(client) => client,
        TokenCheck::Invalid => {
            warn!("Invalid boot token presented");
            let details = format!("Invalid boot token: {}", log_prefix(&token));
            state.audit(AuditAction::InvalidBootToken, &details, &ip).await;
            return Err(ApiError::InvalidToken);
        }
        TokenCheck::Expired {
            client_id,
            expired_at,
        } => {
            let details = format!(
                "Expired boot token for client {client_id}: {} (expired at {expired_at})",
                log_prefix(&token)
            );
            state.audit(AuditAction::ExpiredBootToken, &details, &ip).await;
            return Err(ApiError::ExpiredToken);
        }
    };

    let password = match state.registry.open_secret(&client) {
        Ok(secret) => secret.map(thinboot_crypto::Plaintext::into_inner).unwrap_or_default(),
        Err(e) => {
            error!(mac = %client.mac, error = %e, "Failed to open stored RDP secret");
            return Err(ApiError::Internal);
        }
    };

    if !state.tokens.consume(client.id, &token).await? {
        warn!(mac = %client.mac, "Boot token consumed by a concurrent request");
        return Err(ApiError::InvalidToken);
    }

    info!(mac = %client.mac, "Credentials issued");
    Ok(Json(CredentialsResponse {
        rdp_server: client
            .rdp_server
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| state.scripts.settings().rds_server.clone()),
        rdp_domain: client.rdp_domain.clone().unwrap_or_default(),
        rdp_username: client.rdp_username.clone().unwrap_or_default(),
        rdp_password: password,
    }))
}
