//! Tokio-based scheduler for recurring sweeps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::ports::{ScheduledTask, Scheduler};

pub struct TokioScheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for handle in self.tasks.get_mut().values() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn register(&self, name: &str, every: Duration, task: Arc<dyn ScheduledTask>) {
        let mut tasks = self.tasks.lock().await;

        if let Some(previous) = tasks.remove(name) {
            previous.abort();
        }

        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracing::debug!(task = %task_name, "Running scheduled task");
                task.run().await;
            }
        });

        tasks.insert(name.to_string(), handle);
    }

    async fn remove(&self, name: &str) {
        if let Some(handle) = self.tasks.lock().await.remove(name) {
            handle.abort();
        }
    }
}
