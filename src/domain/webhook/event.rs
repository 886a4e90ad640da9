//! Marketplace webhook event envelope and parsing.
//!
//! Each marketplace posts its own payload shape; parsing normalizes the
//! fields the router needs (id, timestamp, event kind, remote listing id)
//! and keeps the rest as opaque JSON.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::account::Marketplace;

use super::WebhookError;

/// Event kinds the router dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    /// A listing sold on the marketplace.
    ItemSold,
    /// A listing ended without a sale (expired, withdrawn).
    ItemEnded,
    /// The marketplace suspended the listing.
    ItemSuspended,
    /// Anything the router has no handler for. Acknowledged, not processed.
    Unknown,
}

/// A verified, normalized webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub marketplace: Marketplace,
    /// Marketplace-assigned event id, when present. Used for dedup.
    pub event_id: Option<String>,
    /// Event timestamp, when present.
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: WebhookEventKind,
    /// The marketplace's identifier for the affected listing.
    pub remote_listing_id: Option<String>,
    /// Full payload for handlers that need marketplace-specific fields.
    pub payload: Value,
}

impl WebhookEnvelope {
    /// Parses a raw payload into an envelope.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::ParseError` when the body is not a JSON object.
    pub fn parse(marketplace: Marketplace, body: &[u8]) -> Result<Self, WebhookError> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        if !payload.is_object() {
            return Err(WebhookError::ParseError(
                "payload must be a JSON object".to_string(),
            ));
        }

        let (event_id, timestamp, event_type, remote_listing_id) = match marketplace {
            Marketplace::Ebay => (
                str_field(&payload, "notificationId"),
                str_field(&payload, "eventDate").and_then(parse_rfc3339),
                str_field(&payload, "eventType"),
                str_field(&payload, "listingId"),
            ),
            Marketplace::Amazon => (
                str_field(&payload, "notificationId"),
                str_field(&payload, "eventTime").and_then(parse_rfc3339),
                str_field(&payload, "notificationType"),
                str_field(&payload, "sku"),
            ),
            Marketplace::Facebook => (
                str_field(&payload, "id"),
                payload
                    .get("time")
                    .and_then(Value::as_i64)
                    .and_then(|s| DateTime::from_timestamp(s, 0)),
                str_field(&payload, "field"),
                str_field(&payload, "listing_id"),
            ),
        };

        let kind = event_type
            .as_deref()
            .map(|t| classify(marketplace, t))
            .unwrap_or(WebhookEventKind::Unknown);

        Ok(Self {
            marketplace,
            event_id,
            timestamp,
            kind,
            remote_listing_id,
            payload,
        })
    }
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_rfc3339(s: String) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn classify(marketplace: Marketplace, event_type: &str) -> WebhookEventKind {
    match marketplace {
        Marketplace::Ebay => match event_type {
            "ITEM_SOLD" => WebhookEventKind::ItemSold,
            "ITEM_ENDED" => WebhookEventKind::ItemEnded,
            "ITEM_SUSPENDED" => WebhookEventKind::ItemSuspended,
            _ => WebhookEventKind::Unknown,
        },
        Marketplace::Amazon => match event_type {
            "ORDER_PLACED" => WebhookEventKind::ItemSold,
            "LISTING_CLOSED" => WebhookEventKind::ItemEnded,
            "LISTING_SUPPRESSED" => WebhookEventKind::ItemSuspended,
            _ => WebhookEventKind::Unknown,
        },
        Marketplace::Facebook => match event_type {
            "marketplace_order" => WebhookEventKind::ItemSold,
            "marketplace_listing_removed" => WebhookEventKind::ItemEnded,
            "marketplace_listing_rejected" => WebhookEventKind::ItemSuspended,
            _ => WebhookEventKind::Unknown,
        },
    }
}
