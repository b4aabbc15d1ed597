//! HTTP surface of the boot server.
//!
//! - `GET /boot/{mac}` and `GET /boot/{mac}/test`: iPXE scripts, rate
//!   limited per caller IP
//! - `GET /credentials/{token}`: one-time RDP credential handoff
//! - `GET|POST /heartbeat/{mac}`: liveness
//! - `POST /client-log`, `POST /client-log/batch`, `POST /metrics` and
//!   `POST /diagnostic/{mac}`: device reports, rate limited per MAC

mod boot;
mod client_ip;
mod credentials;
mod error;
mod heartbeat;
mod ingest;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use thinboot_core::{MacAddress, ServerConfig};
use thinboot_crypto::CredentialVault;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::diagnostics::DiagnosticStore;
use crate::liveness::LivenessTracker;
use crate::ratelimit::RateLimiter;
use crate::registry::ClientRegistry;
use crate::script::{DirCatalog, OuiTable, ScriptGenerator, ScriptSettings};
use crate::storage::{AuditAction, BootDatabase};
use crate::tokens::TokenManager;

pub use client_ip::ClientIp;
pub use error::{ApiError, PlainText};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: ClientRegistry,
    pub tokens: TokenManager,
    pub liveness: LivenessTracker,
    pub scripts: ScriptGenerator,
    pub diagnostics: DiagnosticStore,
    pub boot_limiter: Arc<RateLimiter>,
    pub ingest_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire every component from the loaded configuration.
    pub fn from_config(db: BootDatabase, vault: Arc<CredentialVault>, config: &ServerConfig) -> Self {
        let window = Duration::from_secs(config.rate_window_secs);
        let scripts = ScriptGenerator::new(
            ScriptSettings::from(config),
            Arc::new(OuiTable::default()),
            Arc::new(DirCatalog::new(&config.initrd_dir)),
        );

        Self {
            registry: ClientRegistry::new(db.clone(), vault, config.rds_server.clone()),
            tokens: TokenManager::new(db.clone(), config.token_ttl_secs),
            liveness: LivenessTracker::new(db),
            scripts,
            diagnostics: DiagnosticStore::new(&config.diagnostic_dir),
            boot_limiter: Arc::new(RateLimiter::new(config.boot_rate_limit, window)),
            ingest_limiter: Arc::new(RateLimiter::new(config.ingest_rate_limit, window)),
        }
    }

    pub const fn db(&self) -> &BootDatabase {
        self.registry.db()
    }

    /// Record a security event. A failed write is logged, never raised.
    pub async fn audit(&self, action: AuditAction, details: &str, ip: &str) {
        if let Err(e) = self.db().record_audit_event(action, details, Some(ip)).await {
            warn!(action = action.as_str(), error = %e, "Failed to record audit event");
        }
    }
}

/// Parse a MAC from a request, logging rejects at INFO.
fn parse_mac(raw: &str) -> Result<MacAddress, ApiError> {
    MacAddress::parse(raw).map_err(|_| {
        info!(mac = %raw, "Rejected malformed MAC address");
        ApiError::InvalidMac
    })
}

/// Build the axum router.
pub fn build_router(state: AppState) -> Router {
    let boot = Router::new()
        .route("/boot/{mac}", get(boot::boot_script))
        .route("/boot/{mac}/test", get(boot::boot_script_test))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_boot,
        ));

    Router::new()
        .merge(boot)
        .route("/credentials/{token}", get(credentials::redeem))
        .route(
            "/heartbeat/{mac}",
            get(heartbeat::heartbeat).post(heartbeat::heartbeat),
        )
        .route("/client-log", post(ingest::client_log))
        .route("/client-log/batch", post(ingest::client_log_batch))
        .route("/diagnostic/{mac}", post(ingest::diagnostic))
        .route("/metrics", post(ingest::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
