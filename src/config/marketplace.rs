//! Per-marketplace configuration: OAuth app credentials and webhook secrets.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::account::Marketplace;

use super::error::ValidationError;

/// OAuth app credentials and webhook secret for one marketplace.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceAppConfig {
    /// OAuth application id (client id)
    #[serde(default)]
    pub app_id: String,

    /// OAuth application secret (client secret)
    #[serde(default = "empty_secret")]
    pub app_secret: SecretString,

    /// Webhook signing secret
    #[serde(default = "empty_secret")]
    pub webhook_secret: SecretString,

    /// Challenge verification token (marketplaces that prove endpoint
    /// ownership with a hashed challenge)
    #[serde(default)]
    pub verification_token: Option<SecretString>,

    /// OAuth redirect URI registered with the marketplace app
    #[serde(default)]
    pub redirect_uri: String,

    /// Use the marketplace's sandbox endpoints
    #[serde(default)]
    pub sandbox: bool,
}

impl MarketplaceAppConfig {
    /// True when OAuth app credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.expose_secret().is_empty()
    }
}

// SecretString has no Default, so the derive cannot be used here.
impl Default for MarketplaceAppConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: empty_secret(),
            webhook_secret: empty_secret(),
            verification_token: None,
            redirect_uri: String::new(),
            sandbox: false,
        }
    }
}

/// Configuration for all marketplaces.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MarketplacesConfig {
    #[serde(default)]
    pub ebay: MarketplaceAppConfig,

    #[serde(default)]
    pub amazon: MarketplaceAppConfig,

    #[serde(default)]
    pub facebook: MarketplaceAppConfig,
}

impl MarketplacesConfig {
    /// Config for one marketplace.
    pub fn get(&self, marketplace: Marketplace) -> &MarketplaceAppConfig {
        match marketplace {
            Marketplace::Ebay => &self.ebay,
            Marketplace::Amazon => &self.amazon,
            Marketplace::Facebook => &self.facebook,
        }
    }

    /// Validate marketplace configuration.
    ///
    /// A marketplace may be left unconfigured (its OAuth routes reject per
    /// call), but a configured marketplace must carry a webhook secret.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for marketplace in Marketplace::ALL {
            let config = self.get(marketplace);
            if config.is_configured() && config.webhook_secret.expose_secret().is_empty() {
                return Err(ValidationError::MissingWebhookSecret(marketplace.as_str()));
            }
        }
        Ok(())
    }
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}
