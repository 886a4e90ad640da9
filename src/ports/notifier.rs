//! ExpiryNotifier port - user-facing notifications from the token monitor.

use async_trait::async_trait;

use crate::domain::account::MarketplaceAccount;

/// Port for notifying organizations about token lifecycle events.
///
/// Implementations must not fail the monitor sweep; errors are theirs to
/// swallow and report.
#[async_trait]
pub trait ExpiryNotifier: Send + Sync {
    /// Token expires within the warning window; no action required yet.
    async fn notify_expiring_soon(&self, account: &MarketplaceAccount, hours_left: f64);

    /// Token expired or the refresh budget is exhausted; reconnect required.
    async fn notify_expired(&self, account: &MarketplaceAccount);
}
