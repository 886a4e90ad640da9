//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - sqlx-backed repositories and the audit sink
//! - `marketplaces` - per-marketplace OAuth drivers and API clients
//! - `http` - Axum REST API and webhook ingestion
//! - `dedup` - bounded in-memory webhook dedup store
//! - `queue` - in-process job queue backed by Tokio tasks
//! - `scheduler` - recurring in-process sweeps
//! - `notifier` - log-based token expiry notifications

pub mod dedup;
pub mod http;
pub mod marketplaces;
pub mod notifier;
pub mod postgres;
pub mod queue;
pub mod scheduler;

pub use dedup::{DedupSweep, InMemoryDedupStore};
pub use http::{app_router, AppState};
pub use marketplaces::registry_from_config;
pub use notifier::LogNotifier;
pub use queue::InProcessJobQueue;
pub use scheduler::TokioScheduler;
