//! Foundation types shared across the domain: ids and errors.

mod errors;
mod ids;

pub use errors::{DomainError, ErrorCode};
pub use ids::{AccountId, AuditRecordId, ItemId, ListingId, OrgId, UserId};
