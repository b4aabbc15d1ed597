//! Client lifecycle events and security audit events.

use sqlx::SqliteExecutor;
use thinboot_core::db::unix_timestamp;

use super::db::{BootDatabase, DatabaseError};
use super::models::{AuditEvent, ClientEvent};

/// Actor recorded on audit events raised by the server itself.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Severity of a client event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl EventLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse a device-supplied level, case-insensitively. Anything outside
    /// the five known names becomes `Info`.
    pub fn from_client(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Self::Debug,
            "WARN" => Self::Warn,
            "ERROR" => Self::Error,
            "CRITICAL" => Self::Critical,
            _ => Self::Info,
        }
    }
}

/// What a client event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Registration,
    Boot,
    ClientLog,
}

impl EventCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Boot => "boot",
            Self::ClientLog => "client_log",
        }
    }
}

/// Security-relevant actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    InvalidBootToken,
    ExpiredBootToken,
    RateLimitExceeded,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidBootToken => "INVALID_BOOT_TOKEN",
            Self::ExpiredBootToken => "EXPIRED_BOOT_TOKEN",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }
}

/// Insert a client event on any executor, so it can join a caller's
/// transaction.
pub(crate) async fn insert_client_event<'e, E>(
    executor: E,
    client_id: i64,
    level: EventLevel,
    category: EventCategory,
    details: &str,
    ip_address: Option<&str>,
    now: i64,
) -> Result<(), DatabaseError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO client_events (client_id, level, category, details, ip_address, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(client_id)
    .bind(level.as_str())
    .bind(category.as_str())
    .bind(details)
    .bind(ip_address)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

impl BootDatabase {
    /// Record an event against a client.
    pub async fn record_client_event(
        &self,
        client_id: i64,
        level: EventLevel,
        category: EventCategory,
        details: &str,
        ip_address: Option<&str>,
    ) -> Result<(), DatabaseError> {
        insert_client_event(
            self.pool(),
            client_id,
            level,
            category,
            details,
            ip_address,
            unix_timestamp(),
        )
        .await
    }

    /// Record a security event raised by the server.
    pub async fn record_audit_event(
        &self,
        action: AuditAction,
        details: &str,
        ip_address: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO audit_events (actor, action, details, ip_address, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(SYSTEM_ACTOR)
        .bind(action.as_str())
        .bind(details)
        .bind(ip_address)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Events for one client, oldest first.
    pub async fn list_client_events(&self, client_id: i64) -> Result<Vec<ClientEvent>, DatabaseError> {
        let events = sqlx::query_as::<_, ClientEvent>(
            "SELECT * FROM client_events WHERE client_id = ? ORDER BY id",
        )
        .bind(client_id)
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }

    /// Audit events with the given action, oldest first.
    pub async fn list_audit_events(&self, action: AuditAction) -> Result<Vec<AuditEvent>, DatabaseError> {
        let events = sqlx::query_as::<_, AuditEvent>(
            "SELECT * FROM audit_events WHERE action = ? ORDER BY id",
        )
        .bind(action.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }
}
