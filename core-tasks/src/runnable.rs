//! The task envelope contract.

use crate::context::TaskContext;
use crate::error::Result;
use async_trait::async_trait;

/// A unit of work the [`crate::TaskRunner`] can execute.
///
/// The runner calls `setup`, then `execute`, then always `teardown`, once
/// per attempt. Input is cloned for every attempt, so implementations must
/// not rely on state left behind by a previous attempt.
#[async_trait]
pub trait Runnable: Send + Sync {
    type Input: Clone + Send + Sync + 'static;
    type Output: Send + 'static;

    /// Registered task name, e.g. `garmin.download_daily_data`.
    fn name(&self) -> &str;

    /// Acquire per-attempt resources. Must be idempotent.
    async fn setup(&self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &TaskContext, input: Self::Input) -> Result<Self::Output>;

    /// Release whatever `setup` acquired. Runs on every exit path.
    async fn teardown(&self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }
}
