//! Client status transitions.
//!
//! Every status write in the server goes through [`transition`] or
//! [`sweep_target`]; nothing else picks a status.

use crate::storage::ClientStatus;

/// A `booting` client silent for longer than this is considered offline.
pub const BOOTING_TIMEOUT_SECS: i64 = 10 * 60;

/// An `online` client silent for longer than this is considered offline.
pub const ONLINE_TIMEOUT_SECS: i64 = 5 * 60;

/// Something a device did that may move its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    /// A boot script request was accepted.
    BootAccepted,
    /// Explicit heartbeat call.
    Heartbeat,
    /// Metrics report; `connected` when the remote session is established.
    SessionReport { connected: bool },
}

/// Status after `event` happens to a client in `status`.
pub const fn transition(status: ClientStatus, event: LivenessEvent) -> ClientStatus {
    match (status, event) {
        (_, LivenessEvent::BootAccepted) => ClientStatus::Booting,
        (_, LivenessEvent::Heartbeat)
        | (ClientStatus::Booting, LivenessEvent::SessionReport { connected: true }) => {
            ClientStatus::Online
        }
        (current, LivenessEvent::SessionReport { .. }) => current,
    }
}

/// Status a sweep at `now` should move a client to, or `None` to leave it.
pub fn sweep_target(
    status: ClientStatus,
    last_seen: Option<i64>,
    last_boot: Option<i64>,
    now: i64,
) -> Option<ClientStatus> {
    let (reference, timeout) = match status {
        ClientStatus::Offline => return None,
        ClientStatus::Booting => (last_seen.or(last_boot), BOOTING_TIMEOUT_SECS),
        ClientStatus::Online => (last_seen, ONLINE_TIMEOUT_SECS),
    };

    match reference {
        Some(ts) if now - ts <= timeout => None,
        _ => Some(ClientStatus::Offline),
    }
}
