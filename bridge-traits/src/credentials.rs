//! Encrypted Credential Records
//!
//! The credential table is owned by the provisioning flow. The core only
//! reads it, one row per user, and never caches what it reads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::error::Result;

/// One row of the upstream credential table.
///
/// `encrypted_password` is opaque ciphertext; it is excluded from `Debug`
/// output so records can be logged safely.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub user_id: Uuid,
    pub upstream_username: String,
    pub encrypted_password: String,
    pub encryption_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("user_id", &self.user_id)
            .field("upstream_username", &self.upstream_username)
            .field("encrypted_password", &"[REDACTED]")
            .field("encryption_version", &self.encryption_version)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Decrypted upstream login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both halves present.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Read access to the credential table.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the record for `user_id`, if one exists.
    async fn find_by_user_id(&self, user_id: &Uuid) -> Result<Option<CredentialRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_hides_secrets() {
        let creds = Credentials::new("runner@example.com", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("runner@example.com"));
        assert!(!rendered.contains("hunter2"));

        let record = CredentialRecord {
            user_id: Uuid::new_v4(),
            upstream_username: "runner".to_string(),
            encrypted_password: "AAAAAQ-ciphertext".to_string(),
            encryption_version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let rendered = format!("{:?}", record);
        assert!(!rendered.contains("AAAAAQ-ciphertext"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_is_complete() {
        assert!(Credentials::new("a", "b").is_complete());
        assert!(!Credentials::new("", "b").is_complete());
        assert!(!Credentials::new("a", "").is_complete());
    }
}
