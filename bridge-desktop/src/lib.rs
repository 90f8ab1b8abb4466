//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for hosts that run the workers
//! on a regular server or desktop OS.
//!
//! ## Overview
//!
//! - `FileSystemAccess` using `tokio::fs`
//!
//! The credential table, document store, upstream client and processors are
//! deployment-specific and are injected by the host.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TokioFileSystem;
//! use bridge_traits::FileSystemAccess;
//! use std::sync::Arc;
//!
//! let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
//! ```

mod filesystem;

pub use filesystem::TokioFileSystem;
