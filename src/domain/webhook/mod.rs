//! Inbound webhook verification and event normalization.

mod event;
mod verifier;

pub use event::{WebhookEnvelope, WebhookEventKind};
pub use verifier::{WebhookError, WebhookVerifier, MAX_PAYLOAD_BYTES};
