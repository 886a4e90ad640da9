//! Token expiration monitor.
//!
//! A periodic sweep over active accounts with expiring tokens. Tiered by
//! time to expiry: inside the warning window the org is notified, inside
//! the refresh window the monitor refreshes proactively, and accounts whose
//! refresh budget is exhausted are expired and flagged for reconnect.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::domain::account::MarketplaceAccount;
use crate::domain::audit::{AuditEventType, AuditRecord};
use crate::ports::{AccountRepository, ExpiryNotifier, ScheduledTask};

use super::accounts::AccountService;
use super::audit::Auditor;

/// Tokens expiring within this window trigger a notification.
const WARNING_WINDOW_HOURS: i64 = 24;

/// Tokens expiring within this window trigger a proactive refresh.
const REFRESH_WINDOW_HOURS: i64 = 1;

pub struct TokenMonitor {
    accounts: Arc<dyn AccountRepository>,
    service: Arc<AccountService>,
    notifier: Arc<dyn ExpiryNotifier>,
    auditor: Auditor,
}

impl TokenMonitor {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        service: Arc<AccountService>,
        notifier: Arc<dyn ExpiryNotifier>,
        auditor: Auditor,
    ) -> Self {
        Self {
            accounts,
            service,
            notifier,
            auditor,
        }
    }

    /// One pass over accounts whose token expires within the warning
    /// window. Per-account failures are contained; one bad account never
    /// stops the sweep.
    pub async fn sweep(&self) -> Result<SweepOutcome, crate::domain::foundation::DomainError> {
        let now = Utc::now();
        let cutoff = now + Duration::hours(WARNING_WINDOW_HOURS);
        let expiring = self.accounts.find_active_expiring_before(cutoff).await?;

        let mut outcome = SweepOutcome::default();
        for mut account in expiring {
            outcome.examined += 1;
            // Every examined account gets a check stamp; each branch below
            // persists the row it ends on.
            account.touch_checked(now);
            let hours_left = account.hours_until_expiry(now).unwrap_or(0.0);

            if hours_left <= 0.0 {
                // Already expired; no refresh can rescue a dead token
                // window, the user has to see the reconnect prompt.
                self.expire(&mut account).await;
                outcome.expired += 1;
            } else if hours_left > REFRESH_WINDOW_HOURS as f64 {
                self.warn(&account, hours_left).await;
                outcome.warned += 1;
            } else if account.encrypted_refresh_token.is_some()
                && !account.refresh_attempts_exhausted()
            {
                if self.attempt_refresh(&mut account).await {
                    outcome.refreshed += 1;
                } else if account.refresh_attempts_exhausted() {
                    self.expire(&mut account).await;
                    outcome.expired += 1;
                } else {
                    outcome.failed += 1;
                }
            } else {
                self.expire(&mut account).await;
                outcome.expired += 1;
            }
        }

        if outcome.examined > 0 {
            tracing::info!(
                examined = outcome.examined,
                warned = outcome.warned,
                refreshed = outcome.refreshed,
                expired = outcome.expired,
                failed = outcome.failed,
                "Token monitor sweep complete"
            );
        }
        Ok(outcome)
    }

    async fn warn(&self, account: &MarketplaceAccount, hours_left: f64) {
        self.notifier.notify_expiring_soon(account, hours_left).await;
        self.auditor
            .record(
                AuditRecord::new(
                    account.org_id,
                    AuditEventType::TokenExpiryWarning,
                    format!(
                        "{} token expires in {hours_left:.1} hours",
                        account.marketplace
                    ),
                )
                .with_account(account.id, account.marketplace),
            )
            .await;

        if let Err(e) = self.accounts.update(account).await {
            tracing::warn!(account_id = %account.id, error = %e, "Failed to stamp monitor check");
        }
    }

    /// Budget is reserved through an atomic conditional increment before
    /// the refresh call, so a crash mid-attempt still consumes it and two
    /// concurrent sweeps cannot push the counter past the cap.
    async fn attempt_refresh(&self, account: &mut MarketplaceAccount) -> bool {
        match self.accounts.reserve_refresh_attempt(account.id).await {
            Ok(Some(reserved)) => *account = reserved,
            Ok(None) => {
                // A racing sweep took the remaining budget.
                account.auto_refresh_attempts = crate::domain::account::MAX_AUTO_REFRESH_ATTEMPTS;
                return false;
            }
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Failed to reserve refresh attempt");
                return false;
            }
        }

        match self.service.perform_refresh(account).await {
            Ok(()) => {
                self.auditor
                    .record(
                        AuditRecord::new(
                            account.org_id,
                            AuditEventType::AccountRefreshed,
                            format!("Auto-refreshed {} tokens", account.marketplace),
                        )
                        .with_account(account.id, account.marketplace),
                    )
                    .await;
                true
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account.id,
                    marketplace = %account.marketplace,
                    attempt = account.auto_refresh_attempts,
                    error = %e,
                    "Auto-refresh attempt failed"
                );
                false
            }
        }
    }

    async fn expire(&self, account: &mut MarketplaceAccount) {
        if let Err(e) = account.mark_expired() {
            tracing::warn!(account_id = %account.id, error = %e, "Cannot expire account");
            return;
        }
        if let Err(e) = self.accounts.update(account).await {
            tracing::warn!(account_id = %account.id, error = %e, "Failed to persist expiry");
            return;
        }
        self.notifier.notify_expired(account).await;
        self.auditor
            .record(
                AuditRecord::new(
                    account.org_id,
                    AuditEventType::AccountExpired,
                    format!("{} token expired; reconnect required", account.marketplace),
                )
                .with_account(account.id, account.marketplace),
            )
            .await;
    }
}

#[async_trait]
impl ScheduledTask for TokenMonitor {
    async fn run(&self) {
        if let Err(e) = self.sweep().await {
            tracing::error!(error = %e, "Token monitor sweep failed");
        }
    }
}

/// Counters from one monitor pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub examined: usize,
    pub warned: usize,
    pub refreshed: usize,
    pub expired: usize,
    pub failed: usize,
}
