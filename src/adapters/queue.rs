//! In-process job queue.
//!
//! Runs publish and sync jobs on spawned tasks. Durability, retry backoff,
//! and dead-lettering belong to an external broker in larger deployments;
//! this adapter covers single-instance operation and keeps the port's
//! semantics, including named recurring registration with remove-then-add.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::application::{PublishProcessor, SyncProcessor};
use crate::domain::foundation::DomainError;
use crate::ports::{JobQueue, PublishJob, SyncJob};

pub struct InProcessJobQueue {
    publish: Arc<PublishProcessor>,
    sync: Arc<SyncProcessor>,
    recurring: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl InProcessJobQueue {
    pub fn new(publish: Arc<PublishProcessor>, sync: Arc<SyncProcessor>) -> Self {
        Self {
            publish,
            sync,
            recurring: Mutex::new(HashMap::new()),
        }
    }
}

impl Drop for InProcessJobQueue {
    fn drop(&mut self) {
        for handle in self.recurring.get_mut().values() {
            handle.abort();
        }
    }
}

#[async_trait]
impl JobQueue for InProcessJobQueue {
    async fn enqueue_publish(&self, job: PublishJob) -> Result<(), DomainError> {
        let processor = self.publish.clone();
        tokio::spawn(async move {
            if let Err(e) = processor.process(job).await {
                tracing::error!(error = %e, "Publish job failed");
            }
        });
        Ok(())
    }

    async fn enqueue_sync(&self, job: SyncJob) -> Result<(), DomainError> {
        let processor = self.sync.clone();
        tokio::spawn(async move {
            if let Err(e) = processor.process(job).await {
                tracing::error!(error = %e, "Sync job failed");
            }
        });
        Ok(())
    }

    async fn register_recurring_sync(
        &self,
        name: &str,
        every: Duration,
        job: SyncJob,
    ) -> Result<(), DomainError> {
        let mut recurring = self.recurring.lock().await;

        // Remove-then-add keeps re-registration idempotent across restarts
        // of the wiring code.
        if let Some(previous) = recurring.remove(name) {
            previous.abort();
        }

        let processor = self.sync.clone();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a freshly booted
            // process does not run every recurring job at once.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = processor.process(job.clone()).await {
                    tracing::error!(job = %task_name, error = %e, "Recurring sync failed");
                }
            }
        });

        recurring.insert(name.to_string(), handle);
        Ok(())
    }
}
