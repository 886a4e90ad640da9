//! HTTP adapter - REST API implementation.
//!
//! Exposes account lifecycle, listing jobs, the audit log, and the webhook
//! ingestion endpoint over Axum.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::app_router;
