//! Worker Pool Probe
//!
//! Lets the lifecycle monitor ask the queue runtime how many workers are
//! reachable and how much work is waiting.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait WorkerProbe: Send + Sync {
    /// Number of workers that answered the last ping.
    async fn active_workers(&self) -> Result<usize>;

    /// Messages waiting across all queues.
    async fn queue_depth(&self) -> Result<u64>;
}

/// Probe for a single in-process worker with no broker behind it.
#[derive(Debug, Clone, Default)]
pub struct LocalWorkerProbe;

#[async_trait]
impl WorkerProbe for LocalWorkerProbe {
    async fn active_workers(&self) -> Result<usize> {
        Ok(1)
    }

    async fn queue_depth(&self) -> Result<u64> {
        Ok(0)
    }
}
