//! Scheduler port - recurring in-process sweeps (monitor, retention, dedup
//! cleanup).
//!
//! Registration is keyed by name and idempotent: registering a name that
//! already exists replaces the prior schedule, so wiring is safe to run on
//! every process start.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A unit of recurring work. Runs to completion once started; cancellation
/// between runs is the scheduler's concern.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    async fn run(&self);
}

/// Port for registering recurring tasks.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Registers (or replaces) a recurring task under a stable name.
    async fn register(&self, name: &str, every: Duration, task: Arc<dyn ScheduledTask>);

    /// Removes a registration by name. Unknown names are a no-op.
    async fn remove(&self, name: &str);
}
