//! Applies liveness events to stored clients and runs timeout sweeps.

use thinboot_core::MacAddress;
use thinboot_core::db::unix_timestamp;
use tracing::{debug, info};

use super::state::{LivenessEvent, sweep_target, transition};
use crate::storage::{BootDatabase, Client, DatabaseError, MetricsSnapshot};

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Live clients looked at.
    pub examined: usize,
    /// Clients moved to offline.
    pub demoted: usize,
    /// Demotions dropped because the row changed after it was read.
    pub raced: usize,
}

/// Interprets heartbeats and metrics into status changes.
#[derive(Clone)]
pub struct LivenessTracker {
    db: BootDatabase,
}

impl LivenessTracker {
    pub const fn new(db: BootDatabase) -> Self {
        Self { db }
    }

    /// Record an explicit heartbeat. `None` if the MAC is unknown or the
    /// client is deactivated.
    pub async fn heartbeat(
        &self,
        mac: &MacAddress,
        ip: &str,
        now: i64,
    ) -> Result<Option<Client>, DatabaseError> {
        let Some(client) = self.db.get_active_client_by_mac(mac).await? else {
            return Ok(None);
        };
        let next = transition(client.status, LivenessEvent::Heartbeat);
        let updated = self.db.record_heartbeat(client.id, next, ip, now).await?;
        debug!(mac = %mac, status = %updated.status, "Heartbeat recorded");
        Ok(Some(updated))
    }

    /// Record a metrics report. `None` if the MAC is unknown or inactive.
    ///
    /// The status change is conditional on the status read here, so a
    /// concurrent transition is never overwritten by a stale promotion.
    pub async fn report_metrics(
        &self,
        mac: &MacAddress,
        snapshot: &MetricsSnapshot,
        session_connected: bool,
        ip: &str,
        now: i64,
    ) -> Result<Option<Client>, DatabaseError> {
        let Some(client) = self.db.get_active_client_by_mac(mac).await? else {
            return Ok(None);
        };
        let next = transition(
            client.status,
            LivenessEvent::SessionReport {
                connected: session_connected,
            },
        );
        let updated = self
            .db
            .record_metrics(client.id, snapshot, (client.status, next), ip, now)
            .await?;
        if updated.status != client.status {
            info!(mac = %mac, from = %client.status, to = %updated.status, "Client session established");
        }
        Ok(Some(updated))
    }

    /// Sweep using the current time.
    pub async fn sweep(&self) -> Result<SweepSummary, DatabaseError> {
        self.sweep_at(unix_timestamp()).await
    }

    /// Demote every live client whose last sign of life is too old at `now`.
    ///
    /// Each demotion only applies if the row's status and `last_seen` are
    /// unchanged since it was read, so a heartbeat landing mid-sweep wins.
    pub async fn sweep_at(&self, now: i64) -> Result<SweepSummary, DatabaseError> {
        let clients = self.db.list_live_clients().await?;
        let mut summary = SweepSummary {
            examined: clients.len(),
            ..SweepSummary::default()
        };

        for client in clients {
            let Some(next) = sweep_target(client.status, client.last_seen, client.last_boot, now)
            else {
                continue;
            };
            if self
                .db
                .set_status_if_unchanged(client.id, client.status, client.last_seen, next)
                .await?
            {
                summary.demoted += 1;
                info!(
                    mac = %client.mac,
                    from = %client.status,
                    last_seen = ?client.last_seen,
                    "Client timed out"
                );
            } else {
                summary.raced += 1;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{BootUpdate, ClientStatus, NewClient};
    use thinboot_crypto::BootToken;

    const MIN: i64 = 60;
    const NOW: i64 = 2_000_000;

    async fn setup() -> (LivenessTracker, BootDatabase) {
        let db = BootDatabase::open_in_memory().await.unwrap();
        (LivenessTracker::new(db.clone()), db)
    }

    async fn add(db: &BootDatabase, m: &str) -> (MacAddress, i64) {
        let mac = MacAddress::parse(m).unwrap();
        let id = db
            .create_client(
                &NewClient {
                    mac,
                    hostname: "tc",
                    rdp_server: None,
                    last_ip: "10.0.0.1",
                },
                "registered",
            )
            .await
            .unwrap()
            .id;
        (mac, id)
    }

    async fn boot_at(db: &BootDatabase, id: i64, at: i64) {
        db.apply_boot(&BootUpdate {
            client_id: id,
            status: ClientStatus::Booting,
            ip: "10.0.0.1",
            now: at,
            token: &BootToken::generate(at, 600),
            event_details: "boot",
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn heartbeat_brings_client_online() {
        let (tracker, db) = setup().await;
        let (mac, _) = add(&db, "00:11:22:00:00:01").await;

        let client = tracker.heartbeat(&mac, "10.0.0.9", NOW).await.unwrap().unwrap();
        assert_eq!(client.status, ClientStatus::Online);
        assert_eq!(client.last_seen, Some(NOW));
        assert_eq!(client.last_ip.as_deref(), Some("10.0.0.9"));
    }

    #[tokio::test]
    async fn heartbeat_ignores_unknown_and_inactive() {
        let (tracker, db) = setup().await;
        let unknown = MacAddress::parse("00:11:22:00:00:99").unwrap();
        assert!(tracker.heartbeat(&unknown, "ip", NOW).await.unwrap().is_none());

        let (mac, id) = add(&db, "00:11:22:00:00:02").await;
        db.set_client_active(id, false).await.unwrap();
        assert!(tracker.heartbeat(&mac, "ip", NOW).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn connected_metrics_promote_booting_only() {
        let (tracker, db) = setup().await;
        let (mac, id) = add(&db, "00:11:22:00:00:03").await;
        let snapshot = MetricsSnapshot {
            cpu_usage: Some(5.0),
            ..MetricsSnapshot::default()
        };

        let c = tracker
            .report_metrics(&mac, &snapshot, true, "ip", NOW)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.status, ClientStatus::Offline);

        boot_at(&db, id, NOW).await;
        let c = tracker
            .report_metrics(&mac, &snapshot, false, "ip", NOW + 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.status, ClientStatus::Booting);

        let c = tracker
            .report_metrics(&mac, &snapshot, true, "ip", NOW + 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.status, ClientStatus::Online);
        assert_eq!(c.cpu_usage, Some(5.0));
    }

    #[tokio::test]
    async fn sweep_demotes_stale_booting_clients() {
        let (tracker, db) = setup().await;
        let (_, stale) = add(&db, "00:11:22:00:00:04").await;
        let (_, fresh) = add(&db, "00:11:22:00:00:05").await;
        boot_at(&db, stale, NOW - 11 * MIN).await;
        boot_at(&db, fresh, NOW - 9 * MIN).await;

        let summary = tracker.sweep_at(NOW).await.unwrap();
        assert_eq!(summary.examined, 2);
        assert_eq!(summary.demoted, 1);
        assert_eq!(db.get_client(stale).await.unwrap().status, ClientStatus::Offline);
        assert_eq!(db.get_client(fresh).await.unwrap().status, ClientStatus::Booting);
    }

    #[tokio::test]
    async fn sweep_demotes_stale_online_clients() {
        let (tracker, db) = setup().await;
        let (stale_mac, stale) = add(&db, "00:11:22:00:00:06").await;
        let (fresh_mac, fresh) = add(&db, "00:11:22:00:00:07").await;
        tracker.heartbeat(&stale_mac, "ip", NOW - 6 * MIN).await.unwrap();
        tracker.heartbeat(&fresh_mac, "ip", NOW - 4 * MIN).await.unwrap();

        tracker.sweep_at(NOW).await.unwrap();
        assert_eq!(db.get_client(stale).await.unwrap().status, ClientStatus::Offline);
        assert_eq!(db.get_client(fresh).await.unwrap().status, ClientStatus::Online);
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let (tracker, db) = setup().await;
        let (_, id) = add(&db, "00:11:22:00:00:08").await;
        boot_at(&db, id, NOW - 20 * MIN).await;

        assert_eq!(tracker.sweep_at(NOW).await.unwrap().demoted, 1);
        let again = tracker.sweep_at(NOW).await.unwrap();
        assert_eq!(again, SweepSummary::default());
    }
}
