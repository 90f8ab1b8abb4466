//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `peakflow-workspace`
//! and get the wired [`CoreService`](core_service::CoreService) without
//! listing each crate.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
