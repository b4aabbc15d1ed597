//! One-time boot tokens bound to a single client row.
//!
//! The token value and its expiry live on the client row itself, so a client
//! never holds more than one outstanding token: issuing a new one overwrites
//! the old value. Issuance is written by the boot-update transaction
//! ([`crate::storage::BootDatabase::apply_boot`]); this module mints tokens
//! and owns validation and consumption.

use thinboot_crypto::{BootToken, log_prefix};
use tracing::{debug, warn};

use crate::storage::{BootDatabase, Client, DatabaseError};

/// Outcome of checking a presented token.
#[derive(Debug)]
pub enum TokenCheck {
    Valid(Box<Client>),
    /// No client holds this token.
    Invalid,
    /// The token matched but its TTL had elapsed. It has been cleared.
    Expired { client_id: i64, expired_at: i64 },
}

/// Issues, validates and consumes boot tokens.
#[derive(Clone)]
pub struct TokenManager {
    db: BootDatabase,
    ttl_secs: i64,
}

impl TokenManager {
    pub const fn new(db: BootDatabase, ttl_secs: i64) -> Self {
        Self { db, ttl_secs }
    }

    /// Mint a fresh token valid for the configured TTL after `now`.
    pub fn mint(&self, now: i64) -> BootToken {
        BootToken::generate(now, self.ttl_secs)
    }

    /// Look up the client holding `token`.
    ///
    /// An expired match is cleared before returning, so presenting the same
    /// token again yields [`TokenCheck::Invalid`].
    pub async fn validate(&self, token: &str, now: i64) -> Result<TokenCheck, DatabaseError> {
        if token.is_empty() {
            return Ok(TokenCheck::Invalid);
        }

        let Some(client) = self.db.get_client_by_token(token).await? else {
            return Ok(TokenCheck::Invalid);
        };

        let Some(expires) = client.boot_token_expires else {
            return Ok(TokenCheck::Invalid);
        };

        if now > expires {
            self.db.clear_boot_token(client.id, token).await?;
            warn!(
                client_id = client.id,
                token = %log_prefix(token),
                expired_at = expires,
                "Expired boot token cleared"
            );
            return Ok(TokenCheck::Expired {
                client_id: client.id,
                expired_at: expires,
            });
        }

        Ok(TokenCheck::Valid(Box::new(client)))
    }

    /// Clear `token` from the client if it still holds it.
    ///
    /// Safe to call more than once. Returns `false` when the token was
    /// already gone, which on the redemption path means another request
    /// consumed it first.
    pub async fn consume(&self, client_id: i64, token: &str) -> Result<bool, DatabaseError> {
        let cleared = self.db.clear_boot_token(client_id, token).await?;
        debug!(client_id, token = %log_prefix(token), cleared, "Boot token consumed");
        Ok(cleared)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::{BootUpdate, ClientStatus, NewClient};
    use thinboot_core::MacAddress;

    async fn setup() -> (TokenManager, BootDatabase, i64) {
        let db = BootDatabase::open_in_memory().await.unwrap();
        let client = db
            .create_client(
                &NewClient {
                    mac: MacAddress::parse("00:11:22:33:44:55").unwrap(),
                    hostname: "tc-334455",
                    rdp_server: None,
                    last_ip: "10.0.0.2",
                },
                "registered",
            )
            .await
            .unwrap();
        (TokenManager::new(db.clone(), 600), db, client.id)
    }

    async fn issue(db: &BootDatabase, mgr: &TokenManager, id: i64, now: i64) -> BootToken {
        let token = mgr.mint(now);
        db.apply_boot(&BootUpdate {
            client_id: id,
            status: ClientStatus::Booting,
            ip: "10.0.0.2",
            now,
            token: &token,
            event_details: "boot",
        })
        .await
        .unwrap();
        token
    }

    #[tokio::test]
    async fn valid_token_then_single_consumption() {
        let (mgr, db, id) = setup().await;
        let token = issue(&db, &mgr, id, 1_000).await;

        match mgr.validate(token.value(), 1_300).await.unwrap() {
            TokenCheck::Valid(client) => assert_eq!(client.id, id),
            other => panic!("expected valid, got {other:?}"),
        }
        assert!(mgr.consume(id, token.value()).await.unwrap());
        assert!(!mgr.consume(id, token.value()).await.unwrap());
        assert!(matches!(
            mgr.validate(token.value(), 1_300).await.unwrap(),
            TokenCheck::Invalid
        ));
    }

    #[tokio::test]
    async fn token_is_valid_up_to_its_expiry() {
        let (mgr, db, id) = setup().await;
        let token = issue(&db, &mgr, id, 1_000).await;
        assert!(matches!(
            mgr.validate(token.value(), 1_600).await.unwrap(),
            TokenCheck::Valid(_)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_cleared_on_first_check() {
        let (mgr, db, id) = setup().await;
        let token = issue(&db, &mgr, id, 1_000).await;

        match mgr.validate(token.value(), 1_601).await.unwrap() {
            TokenCheck::Expired {
                client_id,
                expired_at,
            } => {
                assert_eq!(client_id, id);
                assert_eq!(expired_at, 1_600);
            }
            other => panic!("expected expired, got {other:?}"),
        }
        assert!(matches!(
            mgr.validate(token.value(), 1_601).await.unwrap(),
            TokenCheck::Invalid
        ));
    }

    #[tokio::test]
    async fn reissue_supersedes_previous_token() {
        let (mgr, db, id) = setup().await;
        let first = issue(&db, &mgr, id, 1_000).await;
        let second = issue(&db, &mgr, id, 1_010).await;

        assert!(matches!(
            mgr.validate(first.value(), 1_020).await.unwrap(),
            TokenCheck::Invalid
        ));
        assert!(matches!(
            mgr.validate(second.value(), 1_020).await.unwrap(),
            TokenCheck::Valid(_)
        ));
        // The stale token cannot clear the current one.
        assert!(!mgr.consume(id, first.value()).await.unwrap());
    }

    #[tokio::test]
    async fn empty_and_unknown_tokens_are_invalid() {
        let (mgr, _db, _id) = setup().await;
        assert!(matches!(
            mgr.validate("", 0).await.unwrap(),
            TokenCheck::Invalid
        ));
        assert!(matches!(
            mgr.validate("no-such-token", 0).await.unwrap(),
            TokenCheck::Invalid
        ));
    }
}
