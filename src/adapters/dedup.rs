//! In-memory webhook dedup store.
//!
//! Bounded two ways: entries expire after a TTL, and when the size cap is
//! hit the oldest entry is evicted first-in-first-out. Suitable for a
//! single-instance deployment; a shared store slots in behind the same
//! port for multi-instance setups.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::{ScheduledTask, WebhookDedupStore};

pub struct InMemoryDedupStore {
    max_entries: usize,
    ttl: Duration,
    state: RwLock<DedupState>,
}

#[derive(Default)]
struct DedupState {
    seen: HashMap<String, Instant>,
    /// Insertion order for FIFO eviction. May hold stale entries for keys
    /// whose timestamp was since renewed; eviction checks the map first.
    order: VecDeque<(String, Instant)>,
}

impl InMemoryDedupStore {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            state: RwLock::new(DedupState::default()),
        }
    }
}

#[async_trait]
impl WebhookDedupStore for InMemoryDedupStore {
    async fn check_and_record(&self, webhook_id: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.write().await;

        if let Some(recorded_at) = state.seen.get(webhook_id) {
            if now.duration_since(*recorded_at) < self.ttl {
                return false;
            }
        }

        state.seen.insert(webhook_id.to_string(), now);
        state.order.push_back((webhook_id.to_string(), now));

        while state.seen.len() > self.max_entries {
            let Some((key, inserted_at)) = state.order.pop_front() else {
                break;
            };
            // Skip order entries made stale by a TTL-expired re-record.
            if state.seen.get(&key) == Some(&inserted_at) {
                state.seen.remove(&key);
            }
        }

        true
    }

    async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.write().await;

        let DedupState { seen, order } = &mut *state;
        let before = seen.len();
        seen.retain(|_, recorded_at| now.duration_since(*recorded_at) < self.ttl);
        order.retain(|(key, inserted_at)| seen.get(key) == Some(inserted_at));

        before - seen.len()
    }

    async fn len(&self) -> usize {
        self.state.read().await.seen.len()
    }
}

/// Periodic sweep wrapper registered with the scheduler.
pub struct DedupSweep {
    store: std::sync::Arc<dyn WebhookDedupStore>,
}

impl DedupSweep {
    pub fn new(store: std::sync::Arc<dyn WebhookDedupStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ScheduledTask for DedupSweep {
    async fn run(&self) {
        let removed = self.store.sweep_expired().await;
        if removed > 0 {
            tracing::debug!(removed, "Swept expired webhook dedup entries");
        }
    }
}
