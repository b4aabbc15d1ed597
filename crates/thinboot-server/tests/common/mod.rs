//! Shared harness for HTTP-level tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use thinboot_core::{MacAddress, ServerConfig};
use thinboot_crypto::CredentialVault;
use thinboot_server::server::{AppState, build_router};
use thinboot_server::storage::{BootDatabase, Client};

pub const MAC: &str = "00:11:22:33:44:55";
pub const DEVICE_IP: &str = "10.20.0.15";

pub struct TestServer {
    pub state: AppState,
    root: TempDir,
}

/// Status, content type and body text of a response.
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl TestServer {
    /// Server over an in-memory database and an image directory holding only
    /// the minimal initramfs.
    pub async fn start() -> Self {
        let root = tempfile::tempdir().unwrap();
        let images = root.path().join("images");
        std::fs::create_dir(&images).unwrap();
        std::fs::write(images.join("initrd-minimal.img"), b"img").unwrap();

        let config = ServerConfig {
            server_ip: "10.0.0.1".to_string(),
            rds_server: "rds.example.lan".to_string(),
            initrd_dir: images,
            diagnostic_dir: root.path().join("diagnostics"),
            ..ServerConfig::default()
        };
        let db = BootDatabase::open_in_memory().await.unwrap();
        let vault = Arc::new(CredentialVault::derive_for_tests(b"http-test-master-secret").unwrap());

        Self {
            state: AppState::from_config(db, vault, &config),
            root,
        }
    }

    pub fn diagnostic_dir(&self) -> PathBuf {
        self.root.path().join("diagnostics")
    }

    pub fn db(&self) -> &BootDatabase {
        self.state.db()
    }

    /// Send a request from `ip` and return (status, body text).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        ip: &str,
        body: Option<(&str, String)>,
    ) -> (StatusCode, String) {
        let reply = self.request(method, uri, ip, body).await;
        (reply.status, reply.body)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        ip: &str,
        body: Option<(&str, String)>,
    ) -> Reply {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-real-ip", ip);
        let request = match body {
            Some((content_type, payload)) => builder
                .header("content-type", content_type)
                .body(Body::from(payload))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        Reply {
            status,
            content_type,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(Method::GET, uri, DEVICE_IP, None).await
    }

    /// Boot `mac` and return the issued token, if the script carried one.
    pub async fn boot(&self, mac: &str) -> Option<String> {
        let (status, script) = self.get(&format!("/boot/{mac}")).await;
        assert_eq!(status, StatusCode::OK, "boot failed: {script}");
        boot_token(&script)
    }

    pub async fn client(&self, mac: &str) -> Option<Client> {
        self.db()
            .get_client_by_mac(&MacAddress::parse(mac).unwrap())
            .await
            .unwrap()
    }
}

/// Value of the `boottoken=` kernel parameter in a script.
pub fn boot_token(script: &str) -> Option<String> {
    script
        .split_whitespace()
        .find_map(|word| word.strip_prefix("boottoken="))
        .map(str::to_string)
}
