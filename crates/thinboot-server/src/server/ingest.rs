//! Device-submitted logs, metrics and diagnostic reports.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Form, Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use thinboot_core::MacAddress;
use thinboot_core::db::unix_timestamp;
use tracing::{debug, error, info, instrument, warn};

use super::{AppState, ApiError, ClientIp, parse_mac};
use crate::storage::{AuditAction, EventCategory, EventLevel, MetricsSnapshot};

/// Longest stored log message, in bytes.
pub const MAX_LOG_MESSAGE_BYTES: usize = 8 * 1024;

const TRUNCATION_MARKER: &str = "... [TRUNCATED]";

#[derive(Debug, Default, Deserialize)]
pub struct ClientLogForm {
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricsReport {
    pub mac: String,
    pub rdp_status: Option<String>,
    pub cpu_usage: Option<f64>,
    pub mem_percent: Option<f64>,
    pub rx_bytes: Option<i64>,
    pub tx_bytes: Option<i64>,
}

impl MetricsReport {
    const fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cpu_usage: self.cpu_usage,
            mem_usage: self.mem_percent,
            rx_bytes: self.rx_bytes,
            tx_bytes: self.tx_bytes,
        }
    }
}

/// Cut `message` to at most [`MAX_LOG_MESSAGE_BYTES`] on a char boundary,
/// appending a marker when anything was dropped.
fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_LOG_MESSAGE_BYTES {
        return message.to_string();
    }
    let mut end = MAX_LOG_MESSAGE_BYTES;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATION_MARKER}", &message[..end])
}

/// Rate-limit key for a device report: the canonical MAC when the field
/// parses, otherwise the caller's address.
fn rate_key(mac_field: &str, ip: &str) -> String {
    MacAddress::parse(mac_field).map_or_else(|_| format!("IP:{ip}"), |mac| mac.to_string())
}

async fn admit(state: &AppState, key: &str, ip: &str) -> Result<(), ApiError> {
    if state.ingest_limiter.check(key).await {
        return Ok(());
    }
    warn!(key = %key, ip = %ip, "Ingest rate limit exceeded");
    let details = format!("Rate limit exceeded for {key}");
    state.audit(AuditAction::RateLimitExceeded, &details, ip).await;
    Err(ApiError::RateLimited)
}

/// `POST /client-log`: store one log line from a device.
///
/// Unknown MACs are registered first so early boot failures are not lost.
#[instrument(skip_all, fields(ip = %ip))]
pub async fn client_log(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Form(form): Form<ClientLogForm>,
) -> Result<Json<Value>, ApiError> {
    let mac_field = form.mac.trim();
    admit(&state, &rate_key(mac_field, &ip), &ip).await?;

    if mac_field.is_empty() || form.message.is_empty() {
        return Err(ApiError::BadRequest("Missing mac or message".to_string()));
    }
    let mac = parse_mac(mac_field)?;

    let (client, _) = state.registry.register_if_absent(&mac, &ip).await?;
    let level = EventLevel::from_client(&form.level);
    let source = match form.source.trim() {
        "" => "boot",
        s => s,
    };
    let details = format!("[{source}] {}", truncate_message(&form.message));

    let db = state.db();
    db.record_client_event(client.id, level, EventCategory::ClientLog, &details, Some(&ip))
        .await?;
    db.touch_client(client.id, &ip, unix_timestamp()).await?;
    debug!(mac = %mac, level = level.as_str(), source, "Client log stored");

    Ok(Json(json!({ "status": "ok" })))
}

/// One parsed line of a batch upload: `timestamp|level|message|mac`.
#[derive(Debug, PartialEq, Eq)]
struct BatchLine<'a> {
    level: EventLevel,
    message: &'a str,
    mac: MacAddress,
}

/// `None` for lines that cannot be stored. The device timestamp is ignored.
fn parse_batch_line(line: &str) -> Option<BatchLine<'_>> {
    let mut parts = line.splitn(4, '|');
    let _timestamp = parts.next()?;
    let level = parts.next()?;
    let message = parts.next()?.trim();
    let mac = MacAddress::parse(parts.next()?.trim()).ok()?;
    if message.is_empty() {
        return None;
    }
    Some(BatchLine {
        level: EventLevel::from_client(level),
        message,
        mac,
    })
}

/// `POST /client-log/batch`: newline-separated log lines buffered on a device.
///
/// Answers `processed/total` in plain text. Lines that fail to parse or store
/// are counted and skipped.
#[instrument(skip_all, fields(ip = %ip))]
pub async fn client_log_batch(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    body: String,
) -> Result<String, ApiError> {
    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    let first_mac = lines
        .first()
        .copied()
        .and_then(|l| l.splitn(4, '|').nth(3))
        .unwrap_or_default()
        .trim();
    admit(&state, &rate_key(first_mac, &ip), &ip).await?;

    if lines.is_empty() {
        return Err(ApiError::BadRequest("Empty batch".to_string()));
    }

    let db = state.db();
    let now = unix_timestamp();
    let mut processed = 0usize;
    for raw in &lines {
        let Some(line) = parse_batch_line(raw) else {
            debug!(line = %raw, "Skipped malformed batch line");
            continue;
        };
        let stored = async {
            let (client, _) = state.registry.register_if_absent(&line.mac, &ip).await?;
            let message = truncate_message(line.message);
            db.record_client_event(client.id, line.level, EventCategory::ClientLog, &message, Some(&ip))
                .await?;
            db.touch_client(client.id, &ip, now).await?;
            Ok::<_, ApiError>(())
        }
        .await;
        match stored {
            Ok(()) => processed += 1,
            Err(e) => warn!(mac = %line.mac, error = %e, "Failed to store batch line"),
        }
    }

    info!(processed, total = lines.len(), "Client log batch stored");
    Ok(format!("{processed}/{}", lines.len()))
}

/// `POST /diagnostic/{mac}`: free-form diagnostic dump written to disk.
#[instrument(skip_all, fields(ip = %ip))]
pub async fn diagnostic(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(raw_mac): Path<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let mac = parse_mac(&raw_mac)?;
    admit(&state, &mac.to_string(), &ip).await?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("No data received".to_string()));
    }

    let now = unix_timestamp();
    let path = state
        .diagnostics
        .save(&mac, &ip, now, &body)
        .await
        .map_err(|e| {
            error!(mac = %mac, error = %e, "Failed to write diagnostic report");
            ApiError::Internal
        })?;

    if let Some(client) = state.db().get_client_by_mac(&mac).await? {
        state.db().touch_client(client.id, &ip, now).await?;
    }

    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    info!(mac = %mac, file = %file, bytes = body.len(), "Diagnostic report received");
    Ok(Json(json!({
        "status": "received",
        "file": file,
        "message": "Diagnostic report saved",
    })))
}

/// `POST /metrics`: latest resource snapshot plus session state.
///
/// Reports from unknown MACs are acknowledged and dropped.
#[instrument(skip_all, fields(ip = %ip))]
pub async fn metrics(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    body: Result<Json<MetricsReport>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(report) = body.map_err(|e| {
        debug!(error = %e, "Rejected metrics body");
        ApiError::BadRequest("Invalid metrics payload".to_string())
    })?;

    let mac: MacAddress = parse_mac(&report.mac)?;
    admit(&state, &mac.to_string(), &ip).await?;

    let connected = report.rdp_status.as_deref() == Some("connected");
    let updated = state
        .liveness
        .report_metrics(&mac, &report.snapshot(), connected, &ip, unix_timestamp())
        .await?;
    if updated.is_none() {
        debug!(mac = %mac, "Metrics from unknown client ignored");
    }

    Ok(Json(json!({ "status": "ok" })))
}
