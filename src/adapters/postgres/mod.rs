//! PostgreSQL adapters for the storage ports.

mod account_repository;
mod audit_sink;
mod item_store;
mod listing_repository;

pub use account_repository::PostgresAccountRepository;
pub use audit_sink::PostgresAuditSink;
pub use item_store::PostgresItemStore;
pub use listing_repository::PostgresListingRepository;
