//! Marketplace adapters: one OAuth driver and client factory per
//! marketplace, registered into the [`MarketplaceRegistry`] at startup.

use std::sync::Arc;

use crate::application::MarketplaceRegistry;
use crate::config::MarketplacesConfig;
use crate::domain::account::Marketplace;
use crate::ports::{MarketplaceApiError, OAuthError};

mod amazon;
mod ebay;
mod facebook;

pub use amazon::{AmazonClientFactory, AmazonConfig, AmazonOAuthDriver};
pub use ebay::{EbayClientFactory, EbayConfig, EbayOAuthDriver};
pub use facebook::{FacebookClientFactory, FacebookConfig, FacebookOAuthDriver};

/// Builds a registry covering every marketplace with OAuth app credentials
/// configured. Unconfigured marketplaces are left out; the lifecycle
/// service rejects them per call.
pub fn registry_from_config(config: &MarketplacesConfig) -> MarketplaceRegistry {
    let mut registry = MarketplaceRegistry::new();

    for marketplace in Marketplace::ALL {
        let app = config.get(marketplace);
        if !app.is_configured() {
            tracing::debug!(marketplace = %marketplace, "Marketplace not configured, skipping");
            continue;
        }
        match marketplace {
            Marketplace::Ebay => {
                let cfg = EbayConfig::new(app);
                registry.register(
                    marketplace,
                    Arc::new(EbayOAuthDriver::new(cfg.clone())),
                    Arc::new(EbayClientFactory::new(cfg)),
                );
            }
            Marketplace::Amazon => {
                let cfg = AmazonConfig::new(app);
                registry.register(
                    marketplace,
                    Arc::new(AmazonOAuthDriver::new(cfg.clone())),
                    Arc::new(AmazonClientFactory::new(cfg)),
                );
            }
            Marketplace::Facebook => {
                let cfg = FacebookConfig::new(app);
                registry.register(
                    marketplace,
                    Arc::new(FacebookOAuthDriver::new(cfg.clone())),
                    Arc::new(FacebookClientFactory::new(cfg)),
                );
            }
        }
        tracing::info!(marketplace = %marketplace, "Marketplace registered");
    }

    registry
}

fn network_oauth_error(e: reqwest::Error) -> OAuthError {
    OAuthError::Network(e.to_string())
}

fn network_api_error(e: reqwest::Error) -> MarketplaceApiError {
    MarketplaceApiError::Network(e.to_string())
}

/// Builds a URL with percent-encoded query parameters.
fn build_url(base: &str, params: &[(&str, &str)]) -> Result<String, OAuthError> {
    reqwest::Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| OAuthError::Network(format!("Invalid URL {base}: {e}")))
}
