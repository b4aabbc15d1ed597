//! `SQLite` storage for the Thinboot boot server.
//!
//! Persists client rows (identity, configuration, liveness, boot token),
//! per-client lifecycle events and security audit events.

mod db;
mod models;
mod queries;
mod queries_events;


pub use db::{BootDatabase, DatabaseError};
pub use models::*;
pub use queries::{BootUpdate, RdpSettings};
pub use queries_events::{AuditAction, EventCategory, EventLevel, SYSTEM_ACTOR};
