//! Boot script endpoints.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use thinboot_core::db::unix_timestamp;
use thinboot_crypto::BootToken;
use tracing::{error, info, instrument, warn};

use super::{AppState, ApiError, ClientIp, PlainText, parse_mac};
use crate::liveness::{LivenessEvent, transition};
use crate::script::Credential;
use crate::storage::{BootUpdate, Client};

fn script_response(script: String) -> Response {
    ([(CONTENT_TYPE, "text/plain; charset=utf-8")], script).into_response()
}

/// `GET /boot/{mac}`: register if needed, count the boot, issue a token and
/// return the script.
///
/// The boot count is committed before the boot-update transaction. If that
/// transaction fails the device still gets a script, just without a token.
#[instrument(skip(state), fields(ip = %ip))]
pub async fn boot_script(
    State(state): State<AppState>,
    Path(mac): Path<String>,
    ClientIp(ip): ClientIp,
) -> Result<Response, PlainText> {
    let mac = parse_mac(&mac)?;
    let (client, created) = state.registry.register_if_absent(&mac, &ip).await?;
    let now = unix_timestamp();

    let boot_count = match state.db().increment_boot_count(client.id).await {
        Ok(count) => Some(count),
        Err(e) => {
            error!(mac = %mac, error = %e, "Failed to count boot");
            None
        }
    };

    let token = state.tokens.mint(now);
    let details = boot_details(boot_count, created, &ip, &client);
    let update = BootUpdate {
        client_id: client.id,
        status: transition(client.status, LivenessEvent::BootAccepted),
        ip: &ip,
        now,
        token: &token,
        event_details: &details,
    };
    let issued: Option<&BootToken> = match state.db().apply_boot(&update).await {
        Ok(()) => Some(&token),
        Err(e) => {
            error!(
                mac = %mac,
                error = %e,
                "Boot update rolled back, serving script without token"
            );
            None
        }
    };

    // Without a token the only way to hand over the password is inline.
    let fallback = if issued.is_none() {
        legacy_password(&state, &client)
    } else {
        None
    };
    let credential = match (issued, fallback.as_deref()) {
        (Some(token), _) => Credential::Token(token.value()),
        (None, Some(password)) => Credential::LegacyPassword(password),
        (None, None) => Credential::Withheld,
    };

    let script = state.scripts.render(&client, credential)?;
    info!(
        mac = %mac,
        boot_count = ?boot_count,
        created,
        token_issued = issued.is_some(),
        "Boot script served"
    );
    Ok(script_response(script))
}

/// `GET /boot/{mac}/test`: render the script for a known client without
/// touching any state. Credentials are never included.
#[instrument(skip(state), fields(ip = %ip))]
pub async fn boot_script_test(
    State(state): State<AppState>,
    Path(mac): Path<String>,
    ClientIp(ip): ClientIp,
) -> Result<Response, PlainText> {
    let mac = parse_mac(&mac)?;
    let Some(client) = state.registry.find_by_mac(&mac).await? else {
        warn!(mac = %mac, "Test boot for unknown client");
        return Err(ApiError::ClientNotFound.into());
    };

    let script = state.scripts.render(&client, Credential::Withheld)?;
    info!(mac = %mac, "Test boot script served");
    Ok(script_response(script))
}

fn boot_details(boot_count: Option<i64>, created: bool, ip: &str, client: &Client) -> String {
    let count = boot_count.map_or_else(|| "?".to_string(), |n| n.to_string());
    let rds = client.rdp_server.as_deref().unwrap_or("default");
    if created {
        format!("Boot #{count} from IP {ip}. New client first boot. RDS: {rds}")
    } else {
        format!("Boot #{count} from IP {ip}. RDS: {rds}")
    }
}

fn legacy_password(state: &AppState, client: &Client) -> Option<String> {
    match state.registry.open_secret(client) {
        Ok(secret) => secret.map(thinboot_crypto::Plaintext::into_inner),
        Err(e) => {
            warn!(mac = %client.mac, error = %e, "Stored RDP secret unreadable");
            None
        }
    }
}
