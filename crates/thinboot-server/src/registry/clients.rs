//! Lookup, auto-registration and credential storage for thin clients.

use std::sync::Arc;

use thinboot_core::MacAddress;
use thinboot_crypto::{CredentialVault, Plaintext, VaultError};
use tracing::{info, warn};

use crate::storage::{BootDatabase, Client, DatabaseError, NewClient, RdpSettings};

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
}

/// Plain RDP settings as supplied by an administrator.
#[derive(Debug, Clone, Default)]
pub struct RdpCredentials {
    pub server: Option<String>,
    pub domain: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Canonical store of thin-client identity and configuration.
#[derive(Clone)]
pub struct ClientRegistry {
    db: BootDatabase,
    vault: Arc<CredentialVault>,
    default_rdp_server: String,
}

impl ClientRegistry {
    pub const fn new(
        db: BootDatabase,
        vault: Arc<CredentialVault>,
        default_rdp_server: String,
    ) -> Self {
        Self {
            db,
            vault,
            default_rdp_server,
        }
    }

    pub const fn db(&self) -> &BootDatabase {
        &self.db
    }

    pub async fn find_by_mac(&self, mac: &MacAddress) -> Result<Option<Client>, RegistryError> {
        Ok(self.db.get_client_by_mac(mac).await?)
    }

    /// Return the client for `mac`, creating it on first sight.
    ///
    /// Concurrent calls for one MAC all return the same row: the insert that
    /// loses the unique-constraint race re-reads the winner's row. The bool is
    /// `true` only for the caller whose insert created the client.
    pub async fn register_if_absent(
        &self,
        mac: &MacAddress,
        origin_ip: &str,
    ) -> Result<(Client, bool), RegistryError> {
        if let Some(client) = self.db.get_client_by_mac(mac).await? {
            return Ok((client, false));
        }

        let hostname = mac.default_hostname();
        let details = format!("Auto-registered {mac} as {hostname} from {origin_ip}");
        let new = NewClient {
            mac: *mac,
            hostname: &hostname,
            rdp_server: Some(&self.default_rdp_server),
            last_ip: origin_ip,
        };

        match self.db.create_client(&new, &details).await {
            Ok(client) => {
                info!(mac = %mac, hostname = %hostname, ip = %origin_ip, "Client auto-registered");
                Ok((client, true))
            }
            Err(DatabaseError::Conflict(_)) => {
                let client = self
                    .db
                    .get_client_by_mac(mac)
                    .await?
                    .ok_or_else(|| DatabaseError::NotFound(format!("Client {mac}")))?;
                Ok((client, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store RDP settings, sealing the password first.
    ///
    /// If sealing fails nothing is written.
    pub async fn set_rdp_credentials(
        &self,
        client_id: i64,
        creds: &RdpCredentials,
    ) -> Result<(), RegistryError> {
        let sealed = creds
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| self.vault.encrypt(p))
            .transpose()?;

        self.db
            .update_rdp_settings(
                client_id,
                &RdpSettings {
                    server: creds.server.as_deref(),
                    domain: creds.domain.as_deref(),
                    username: creds.username.as_deref(),
                    sealed_password: sealed.as_deref(),
                },
            )
            .await?;

        info!(client_id, "RDP credentials updated");
        Ok(())
    }

    /// Open the stored RDP secret of a client, if it has one.
    pub fn open_secret(&self, client: &Client) -> Result<Option<Plaintext>, RegistryError> {
        client
            .rdp_password
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| self.vault.decrypt(s))
            .transpose()
            .map_err(Into::into)
    }

    /// Seal every stored secret that predates encryption. Returns how many
    /// rows were rewritten.
    ///
    /// Tagged values that do not open are left alone and logged; those rows
    /// need their secret reset.
    pub async fn reencrypt_legacy_secrets(&self) -> Result<usize, RegistryError> {
        let mut migrated = 0;
        for (id, stored) in self.db.list_stored_secrets().await? {
            if CredentialVault::is_envelope(&stored) {
                if let Err(e) = self.vault.decrypt(&stored) {
                    warn!(client_id = id, error = %e, "Stored RDP secret does not open, reset it");
                }
                continue;
            }
            let sealed = self.vault.encrypt(&stored)?;
            if self.db.replace_secret(id, &stored, &sealed).await? {
                migrated += 1;
            } else {
                warn!(client_id = id, "Secret changed during migration, skipped");
            }
        }
        if migrated > 0 {
            info!(migrated, "Legacy RDP secrets re-encrypted");
        }
        Ok(migrated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn registry() -> ClientRegistry {
        let db = BootDatabase::open_in_memory().await.unwrap();
        let vault = Arc::new(CredentialVault::derive_for_tests(b"registry-test").unwrap());
        ClientRegistry::new(db, vault, "rds.local".to_string())
    }

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    #[tokio::test]
    async fn register_creates_once() {
        let reg = registry().await;
        let m = mac("00:0c:29:12:34:56");

        let (first, created) = reg.register_if_absent(&m, "10.0.0.2").await.unwrap();
        assert!(created);
        assert_eq!(first.hostname.as_deref(), Some("tc-123456"));
        assert_eq!(first.rdp_server.as_deref(), Some("rds.local"));

        let (second, created) = reg
            .register_if_absent(&mac("000C29123456"), "10.0.0.3")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);

        let events = reg.db().list_client_events(first.id).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_registration_yields_one_row() {
        let reg = registry().await;
        let m = mac("00:0C:29:AA:00:01");

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let reg = reg.clone();
                tokio::spawn(async move {
                    reg.register_if_absent(&m, &format!("10.0.0.{i}"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = Vec::new();
        let mut created = 0;
        for t in tasks {
            let (client, was_created) = t.await.unwrap();
            ids.push(client.id);
            created += usize::from(was_created);
        }
        assert_eq!(created, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn credentials_are_sealed_at_rest() {
        let reg = registry().await;
        let (client, _) = reg
            .register_if_absent(&mac("00:0C:29:AA:00:02"), "10.0.0.2")
            .await
            .unwrap();

        reg.set_rdp_credentials(
            client.id,
            &RdpCredentials {
                server: Some("rds.corp".to_string()),
                domain: Some("CORP".to_string()),
                username: Some("kiosk".to_string()),
                password: Some("s3cret".to_string()),
            },
        )
        .await
        .unwrap();

        let client = reg.db().get_client(client.id).await.unwrap();
        let stored = client.rdp_password.clone().unwrap();
        assert!(CredentialVault::is_envelope(&stored));
        assert!(!stored.contains("s3cret"));

        let opened = reg.open_secret(&client).unwrap().unwrap();
        assert_eq!(opened, Plaintext::Decrypted("s3cret".to_string()));
    }

    #[tokio::test]
    async fn legacy_secrets_are_migrated() {
        let reg = registry().await;
        let (client, _) = reg
            .register_if_absent(&mac("00:0C:29:AA:00:03"), "10.0.0.2")
            .await
            .unwrap();
        reg.db()
            .update_rdp_settings(
                client.id,
                &RdpSettings {
                    sealed_password: Some("old-plain"),
                    ..RdpSettings::default()
                },
            )
            .await
            .unwrap();

        let before = reg.db().get_client(client.id).await.unwrap();
        assert!(reg.open_secret(&before).unwrap().unwrap().is_legacy());

        assert_eq!(reg.reencrypt_legacy_secrets().await.unwrap(), 1);
        assert_eq!(reg.reencrypt_legacy_secrets().await.unwrap(), 0);

        let after = reg.db().get_client(client.id).await.unwrap();
        assert_eq!(
            reg.open_secret(&after).unwrap(),
            Some(Plaintext::Decrypted("old-plain".to_string()))
        );
    }

    #[tokio::test]
    async fn tagged_plaintext_is_left_for_reset() {
        let reg = registry().await;
        let (client, _) = reg
            .register_if_absent(&mac("00:0C:29:AA:00:05"), "10.0.0.2")
            .await
            .unwrap();
        reg.db()
            .update_rdp_settings(
                client.id,
                &RdpSettings {
                    sealed_password: Some("v1:not-an-envelope"),
                    ..RdpSettings::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(reg.reencrypt_legacy_secrets().await.unwrap(), 0);

        let after = reg.db().get_client(client.id).await.unwrap();
        assert_eq!(after.rdp_password.as_deref(), Some("v1:not-an-envelope"));
        assert!(reg.open_secret(&after).is_err());
    }

    #[tokio::test]
    async fn client_without_secret_opens_to_none() {
        let reg = registry().await;
        let (client, _) = reg
            .register_if_absent(&mac("00:0C:29:AA:00:04"), "10.0.0.2")
            .await
            .unwrap();
        assert!(reg.open_secret(&client).unwrap().is_none());
    }
}
