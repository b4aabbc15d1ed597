//! Thinboot Boot Server Library
//!
//! Core functionality for network-booting thin clients:
//! - SQLite storage for clients, lifecycle events and audit events
//! - MAC auto-registration and sealed RDP credentials
//! - One-time boot tokens and the credential handoff
//! - Liveness state machine with a scheduled timeout sweep
//! - Per-key rate limiting of the unauthenticated endpoints
//! - iPXE boot script rendering
//! - On-disk diagnostic reports from devices
//! - HTTP routes (axum)

pub mod diagnostics;
pub mod liveness;
pub mod ratelimit;
pub mod registry;
pub mod script;
pub mod server;
pub mod storage;
pub mod tokens;
