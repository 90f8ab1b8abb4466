//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by every ingestion crate:
//! - Logging and tracing infrastructure
//! - Typed configuration loaded from the environment
//! - Event bus for task lifecycle and sync progress events
//!
//! ## Overview
//!
//! Task runners publish [`events::TaskEvent`]s on the [`events::EventBus`];
//! the lifecycle monitor subscribes to it. Configuration sections are plain
//! values passed down by the composition root, never read from globals.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
