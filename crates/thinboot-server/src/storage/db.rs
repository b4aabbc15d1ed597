//! `SQLite` database for the Thinboot boot server.

pub use thinboot_core::db::DatabaseError;

thinboot_core::define_database!(BootDatabase, "Boot database migrations complete");
