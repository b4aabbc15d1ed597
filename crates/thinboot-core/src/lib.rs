//! Thinboot Core Library
//!
//! Shared functionality for Thinboot components:
//! - MAC address parsing and canonical form
//! - Server configuration and master secret resolution
//! - `SQLite` pool helpers and timestamps
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod mac;
pub mod tracing_init;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use mac::MacAddress;
