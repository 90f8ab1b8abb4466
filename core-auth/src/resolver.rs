//! Credential Resolver
//!
//! Turns a user id into a decrypted upstream login. Every call reads the
//! credential table and decrypts afresh; decrypted passwords are never
//! cached and never leave the returned [`Credentials`] value.

use crate::encryption::CredentialCipher;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use bridge_traits::credentials::{CredentialStore, Credentials};
use core_runtime::logging::redact_if_sensitive;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Resolve a user's upstream credentials on demand.
///
/// Tasks depend on this trait rather than on [`CredentialResolver`] so they
/// can be exercised with stub providers.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, user_id: &str) -> Result<Credentials>;
}

/// Store-backed [`CredentialProvider`].
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    cipher: CredentialCipher,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>, cipher: CredentialCipher) -> Self {
        Self { store, cipher }
    }
}

#[async_trait]
impl CredentialProvider for CredentialResolver {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn resolve(&self, user_id: &str) -> Result<Credentials> {
        let uuid = Uuid::parse_str(user_id)
            .map_err(|_| AuthError::InvalidIdentifier(user_id.to_string()))?;

        let record = self
            .store
            .find_by_user_id(&uuid)
            .await?
            .ok_or_else(|| AuthError::CredentialsNotFound {
                user_id: user_id.to_string(),
            })?;

        let (embedded_version, password) =
            self.cipher.decrypt_with_version(&record.encrypted_password)?;

        if embedded_version != record.encryption_version {
            warn!(
                record_version = record.encryption_version,
                embedded_version, "Encryption version column disagrees with payload"
            );
            return Err(AuthError::DecryptionFailed(format!(
                "Encryption version mismatch: record says {}, payload says {}",
                record.encryption_version, embedded_version
            )));
        }

        debug!(
            username = %redact_if_sensitive("username", &record.upstream_username),
            "Resolved Garmin credentials"
        );

        Ok(Credentials::new(record.upstream_username, password))
    }
}
