//! Log-based expiry notifier.
//!
//! Emits structured log events for token lifecycle notifications. An email
//! or push adapter implements the same port when user-facing delivery is
//! wired up.

use async_trait::async_trait;

use crate::domain::account::MarketplaceAccount;
use crate::ports::ExpiryNotifier;

pub struct LogNotifier;

#[async_trait]
impl ExpiryNotifier for LogNotifier {
    async fn notify_expiring_soon(&self, account: &MarketplaceAccount, hours_left: f64) {
        tracing::warn!(
            account_id = %account.id,
            org_id = %account.org_id,
            marketplace = %account.marketplace,
            hours_left = format!("{hours_left:.1}"),
            "Marketplace token expiring soon"
        );
    }

    async fn notify_expired(&self, account: &MarketplaceAccount) {
        tracing::error!(
            account_id = %account.id,
            org_id = %account.org_id,
            marketplace = %account.marketplace,
            "Marketplace token expired; account requires reconnection"
        );
    }
}
