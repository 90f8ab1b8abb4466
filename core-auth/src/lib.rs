//! # Credential Resolution
//!
//! Decrypts per-user upstream credentials on demand.
//!
//! ## Overview
//!
//! - [`CredentialCipher`] - versioned AES-256-GCM payloads
//! - [`CredentialProvider`] - the resolution port tasks depend on
//! - [`CredentialResolver`] - store-backed provider; no caching
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{CredentialCipher, CredentialProvider, CredentialResolver};
//!
//! let cipher = CredentialCipher::from_settings(&config.encryption)?;
//! let resolver = CredentialResolver::new(credential_store, cipher);
//! let credentials = resolver.resolve(&user_id).await?;
//! ```

pub mod encryption;
pub mod error;
pub mod resolver;

pub use encryption::{CredentialCipher, EncryptionKey};
pub use error::{AuthError, Result};
pub use resolver::{CredentialProvider, CredentialResolver};
