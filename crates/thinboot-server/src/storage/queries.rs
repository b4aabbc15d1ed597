//! Client queries for the Thinboot boot server.

use thinboot_core::MacAddress;
use thinboot_core::db::unix_timestamp;
use thinboot_crypto::BootToken;

use super::db::{BootDatabase, DatabaseError};
use super::models::{Client, ClientStatus, MetricsSnapshot, NewClient};
use super::queries_events::{EventCategory, EventLevel, insert_client_event};

/// Everything written by the boot-update transaction.
#[derive(Debug)]
pub struct BootUpdate<'a> {
    pub client_id: i64,
    pub status: ClientStatus,
    pub ip: &'a str,
    pub now: i64,
    pub token: &'a BootToken,
    pub event_details: &'a str,
}

/// RDP connection fields; `sealed_password` is already a vault envelope.
#[derive(Debug, Clone, Default)]
pub struct RdpSettings<'a> {
    pub server: Option<&'a str>,
    pub domain: Option<&'a str>,
    pub username: Option<&'a str>,
    pub sealed_password: Option<&'a str>,
}

impl BootDatabase {
    // =========================================================================
    // Lookup
    // =========================================================================

    /// Get a client by ID.
    pub async fn get_client(&self, id: i64) -> Result<Client, DatabaseError> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Client {id}")))
    }

    /// Get a client by canonical MAC, active or not.
    pub async fn get_client_by_mac(&self, mac: &MacAddress) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE mac = ?")
            .bind(mac.to_string())
            .fetch_optional(self.pool())
            .await?;
        Ok(client)
    }

    /// Get a client by canonical MAC, only if it has not been deactivated.
    pub async fn get_active_client_by_mac(
        &self,
        mac: &MacAddress,
    ) -> Result<Option<Client>, DatabaseError> {
        let client =
            sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE mac = ? AND is_active = 1")
                .bind(mac.to_string())
                .fetch_optional(self.pool())
                .await?;
        Ok(client)
    }

    /// Active clients that are not already offline.
    pub async fn list_live_clients(&self) -> Result<Vec<Client>, DatabaseError> {
        let clients = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE is_active = 1 AND status != 'offline' ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(clients)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Insert a client and its registration event in one transaction.
    ///
    /// Fails with [`DatabaseError::Conflict`] when the MAC already exists.
    pub async fn create_client(
        &self,
        new: &NewClient<'_>,
        event_details: &str,
    ) -> Result<Client, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO clients (mac, hostname, rdp_server, last_ip, last_seen, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(new.mac.to_string())
        .bind(new.hostname)
        .bind(new.rdp_server)
        .bind(new.last_ip)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        insert_client_event(
            &mut *tx,
            id,
            EventLevel::Info,
            EventCategory::Registration,
            event_details,
            Some(new.last_ip),
            now,
        )
        .await?;

        tx.commit().await?;
        self.get_client(id).await
    }

    // =========================================================================
    // Boot
    // =========================================================================

    /// Count a boot request. Committed on its own, ahead of the boot-update
    /// transaction, so the count survives a rollback of that transaction.
    pub async fn increment_boot_count(&self, id: i64) -> Result<i64, DatabaseError> {
        sqlx::query_scalar(
            "UPDATE clients SET boot_count = boot_count + 1, updated_at = ? WHERE id = ? RETURNING boot_count",
        )
        .bind(unix_timestamp())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Client {id}")))
    }

    /// Apply the boot transition, store the new token and log the boot.
    ///
    /// All or nothing: on error the row keeps its previous status and token.
    pub async fn apply_boot(&self, update: &BootUpdate<'_>) -> Result<(), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            "UPDATE clients SET status = ?, last_boot = ?, last_seen = ?, last_ip = ?, \
             boot_token = ?, boot_token_expires = ?, updated_at = ? WHERE id = ?",
        )
        .bind(update.status)
        .bind(update.now)
        .bind(update.now)
        .bind(update.ip)
        .bind(update.token.value())
        .bind(update.token.expires_at())
        .bind(update.now)
        .bind(update.client_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Client {}",
                update.client_id
            )));
        }

        insert_client_event(
            &mut *tx,
            update.client_id,
            EventLevel::Info,
            EventCategory::Boot,
            update.event_details,
            Some(update.ip),
            update.now,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Boot tokens
    // =========================================================================

    /// Find the client currently holding `token`.
    pub async fn get_client_by_token(&self, token: &str) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE boot_token = ?")
            .bind(token)
            .fetch_optional(self.pool())
            .await?;
        Ok(client)
    }

    /// Clear the token of client `id` if it still equals `token`.
    ///
    /// Returns `false` when the token was already cleared or replaced, which
    /// makes concurrent redemptions of one token resolve to a single winner.
    pub async fn clear_boot_token(&self, id: i64, token: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE clients SET boot_token = NULL, boot_token_expires = NULL, updated_at = ? \
             WHERE id = ? AND boot_token = ?",
        )
        .bind(unix_timestamp())
        .bind(id)
        .bind(token)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Liveness
    // =========================================================================

    /// Store a heartbeat: `last_seen`, `last_ip` and the resulting status.
    pub async fn record_heartbeat(
        &self,
        id: i64,
        status: ClientStatus,
        ip: &str,
        now: i64,
    ) -> Result<Client, DatabaseError> {
        sqlx::query_as::<_, Client>(
            "UPDATE clients SET status = ?, last_seen = ?, last_ip = ?, updated_at = ? \
             WHERE id = ? RETURNING *",
        )
        .bind(status)
        .bind(now)
        .bind(ip)
        .bind(now)
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Client {id}")))
    }

    /// Store a metrics report.
    ///
    /// The status moves from `expected` to `next` only if the row is still in
    /// `expected`; the snapshot and `last_seen` are written regardless.
    pub async fn record_metrics(
        &self,
        id: i64,
        snapshot: &MetricsSnapshot,
        (expected, next): (ClientStatus, ClientStatus),
        ip: &str,
        now: i64,
    ) -> Result<Client, DatabaseError> {
        sqlx::query_as::<_, Client>(
            "UPDATE clients SET \
                cpu_usage = COALESCE(?, cpu_usage), \
                mem_usage = COALESCE(?, mem_usage), \
                rx_bytes = COALESCE(?, rx_bytes), \
                tx_bytes = COALESCE(?, tx_bytes), \
                status = CASE WHEN status = ? THEN ? ELSE status END, \
                last_seen = ?, last_ip = ?, updated_at = ? \
             WHERE id = ? RETURNING *",
        )
        .bind(snapshot.cpu_usage)
        .bind(snapshot.mem_usage)
        .bind(snapshot.rx_bytes)
        .bind(snapshot.tx_bytes)
        .bind(expected)
        .bind(next)
        .bind(now)
        .bind(ip)
        .bind(now)
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Client {id}")))
    }

    /// Touch `last_seen`/`last_ip` without changing status.
    pub async fn touch_client(&self, id: i64, ip: &str, now: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE clients SET last_seen = ?, last_ip = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(ip)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Move a client to `next` only if status and `last_seen` are unchanged
    /// since the caller read them.
    pub async fn set_status_if_unchanged(
        &self,
        id: i64,
        expected: ClientStatus,
        expected_last_seen: Option<i64>,
        next: ClientStatus,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE clients SET status = ?, updated_at = ? \
             WHERE id = ? AND status = ? AND last_seen IS ?",
        )
        .bind(next)
        .bind(unix_timestamp())
        .bind(id)
        .bind(expected)
        .bind(expected_last_seen)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Replace the RDP connection settings of a client.
    pub async fn update_rdp_settings(
        &self,
        id: i64,
        settings: &RdpSettings<'_>,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE clients SET rdp_server = ?, rdp_domain = ?, rdp_username = ?, rdp_password = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(settings.server)
        .bind(settings.domain)
        .bind(settings.username)
        .bind(settings.sealed_password)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Client {id}")));
        }
        Ok(())
    }

    /// Flip the administrative active flag.
    #[cfg(test)]
    pub(crate) async fn set_client_active(&self, id: i64, active: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE clients SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// All stored RDP secrets as `(client_id, stored_value)`.
    pub async fn list_stored_secrets(&self) -> Result<Vec<(i64, String)>, DatabaseError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, rdp_password FROM clients WHERE rdp_password IS NOT NULL AND rdp_password != ''",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Swap a stored secret if it still holds `old`.
    pub async fn replace_secret(&self, id: i64, old: &str, new: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE clients SET rdp_password = ?, updated_at = ? WHERE id = ? AND rdp_password = ?",
        )
        .bind(new)
        .bind(unix_timestamp())
        .bind(id)
        .bind(old)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
