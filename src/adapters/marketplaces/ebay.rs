//! eBay marketplace adapter: OAuth driver and listing client.
//!
//! Token calls authenticate with HTTP Basic over the app credentials, per
//! eBay's OAuth contract. Listing operations run against the sell API with
//! the account's user token.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::config::MarketplaceAppConfig;
use crate::domain::account::Marketplace;
use crate::domain::listing::{CanonicalListing, ListingStatus};
use crate::ports::{
    CredentialSink, LiveCredentials, MarketplaceApiError, MarketplaceClient,
    MarketplaceClientFactory, MarketplaceOAuthDriver, OAuthError, RemoteListing, TokenGrant,
};

use super::{build_url, network_api_error, network_oauth_error};

const LIVE_AUTH_URL: &str = "https://auth.ebay.com/oauth2/authorize";
const SANDBOX_AUTH_URL: &str = "https://auth.sandbox.ebay.com/oauth2/authorize";
const LIVE_API_URL: &str = "https://api.ebay.com";
const SANDBOX_API_URL: &str = "https://api.sandbox.ebay.com";

const SCOPES: &str = "https://api.ebay.com/oauth/api_scope/sell.inventory";

#[derive(Clone)]
pub struct EbayConfig {
    app_id: String,
    app_secret: SecretString,
    redirect_uri: String,
    auth_base_url: String,
    api_base_url: String,
}

impl EbayConfig {
    pub fn new(config: &MarketplaceAppConfig) -> Self {
        let (auth, api) = if config.sandbox {
            (SANDBOX_AUTH_URL, SANDBOX_API_URL)
        } else {
            (LIVE_AUTH_URL, LIVE_API_URL)
        };
        Self {
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_base_url: auth.to_string(),
            api_base_url: api.to_string(),
        }
    }

    /// Points both auth and API calls at a custom base URL (for tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.auth_base_url = format!("{url}/authorize");
        self.api_base_url = url;
        self
    }

    fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.expose_secret().is_empty()
    }

    fn basic_auth(&self) -> String {
        let pair = format!("{}:{}", self.app_id, self.app_secret.expose_secret());
        format!("Basic {}", BASE64.encode(pair))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(rename = "userId")]
    user_id: String,
}

pub struct EbayOAuthDriver {
    config: EbayConfig,
    http: reqwest::Client,
}

impl EbayOAuthDriver {
    pub fn new(config: EbayConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, OAuthError> {
        let response = self
            .http
            .post(format!("{}/identity/v1/oauth2/token", self.config.api_base_url))
            .header("Authorization", self.config.basic_auth())
            .form(form)
            .send()
            .await
            .map_err(network_oauth_error)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::ExchangeRejected(body));
        }

        response.json().await.map_err(network_oauth_error)
    }

    /// eBay's token response names no account; identity comes from a
    /// follow-up call with the fresh user token.
    async fn fetch_user_id(&self, access_token: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .get(format!(
                "{}/commerce/identity/v1/user/",
                self.config.api_base_url
            ))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(network_oauth_error)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::ExchangeRejected(body));
        }

        let user: UserResponse = response.json().await.map_err(network_oauth_error)?;
        Ok(user.user_id)
    }

    fn grant_from(&self, token: TokenResponse, remote_account_id: String) -> TokenGrant {
        TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            remote_account_id,
        }
    }
}

#[async_trait]
impl MarketplaceOAuthDriver for EbayOAuthDriver {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ebay
    }

    fn auth_url(&self, state: &str) -> Result<String, OAuthError> {
        if !self.config.is_configured() {
            return Err(OAuthError::NotConfigured(Marketplace::Ebay));
        }
        build_url(
            &self.config.auth_base_url,
            &[
                ("client_id", self.config.app_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError> {
        if !self.config.is_configured() {
            return Err(OAuthError::NotConfigured(Marketplace::Ebay));
        }
        let token = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.config.redirect_uri),
            ])
            .await?;
        let user_id = self.fetch_user_id(&token.access_token).await?;
        Ok(self.grant_from(token, user_id))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        let token = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("scope", SCOPES),
            ])
            .await
            .map_err(|e| match e {
                OAuthError::ExchangeRejected(msg) => OAuthError::RefreshRejected(msg),
                other => other,
            })?;
        let user_id = self.fetch_user_id(&token.access_token).await?;
        Ok(self.grant_from(token, user_id))
    }

    async fn revoke(&self, access_token: &str) -> Result<(), OAuthError> {
        let response = self
            .http
            .post(format!(
                "{}/identity/v1/oauth2/revoke",
                self.config.api_base_url
            ))
            .header("Authorization", self.config.basic_auth())
            .form(&[("token", access_token)])
            .send()
            .await
            .map_err(network_oauth_error)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::RevocationFailed(body));
        }
        Ok(())
    }
}

pub struct EbayClientFactory {
    config: EbayConfig,
}

impl EbayClientFactory {
    pub fn new(config: EbayConfig) -> Self {
        Self { config }
    }
}

impl MarketplaceClientFactory for EbayClientFactory {
    // eBay user tokens never rotate mid-call, so the sink goes unused here.
    fn client(
        &self,
        credentials: LiveCredentials,
        _sink: Arc<dyn CredentialSink>,
    ) -> Arc<dyn MarketplaceClient> {
        Arc::new(EbayClient {
            config: self.config.clone(),
            credentials,
            http: reqwest::Client::new(),
        })
    }
}

pub struct EbayClient {
    config: EbayConfig,
    credentials: LiveCredentials,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OfferResponse {
    #[serde(rename = "offerId")]
    offer_id: String,
    #[serde(rename = "listingUrl")]
    listing_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OfferStatusResponse {
    status: String,
    #[serde(rename = "availableQuantity")]
    available_quantity: Option<i32>,
}

#[async_trait]
impl MarketplaceClient for EbayClient {
    async fn publish_listing(
        &self,
        listing: &CanonicalListing,
    ) -> Result<RemoteListing, MarketplaceApiError> {
        let body = json!({
            "sku": listing.item_id,
            "product": {
                "title": listing.title,
                "description": listing.description,
                "aspects": listing.attributes,
            },
            "pricingSummary": {
                "price": {
                    "value": format!("{}.{:02}", listing.price_cents / 100, listing.price_cents % 100),
                    "currency": listing.currency,
                }
            },
            "availableQuantity": listing.quantity,
        });

        let response = self
            .http
            .post(format!("{}/sell/inventory/v1/offer", self.config.api_base_url))
            .bearer_auth(&self.credentials.access_token)
            .json(&body)
            .send()
            .await
            .map_err(network_api_error)?;

        match response.status() {
            status if status.is_success() => {
                let offer: OfferResponse =
                    response.json().await.map_err(network_api_error)?;
                Ok(RemoteListing {
                    remote_listing_id: offer.offer_id,
                    remote_url: offer.listing_url,
                })
            }
            reqwest::StatusCode::UNAUTHORIZED => Err(MarketplaceApiError::Unauthorized),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(MarketplaceApiError::Rejected(body))
            }
        }
    }

    async fn listing_status(
        &self,
        remote_listing_id: &str,
    ) -> Result<ListingStatus, MarketplaceApiError> {
        let response = self
            .http
            .get(format!(
                "{}/sell/inventory/v1/offer/{remote_listing_id}",
                self.config.api_base_url
            ))
            .bearer_auth(&self.credentials.access_token)
            .send()
            .await
            .map_err(network_api_error)?;

        match response.status() {
            status if status.is_success() => {
                let offer: OfferStatusResponse =
                    response.json().await.map_err(network_api_error)?;
                Ok(match offer.status.as_str() {
                    "PUBLISHED" if offer.available_quantity == Some(0) => ListingStatus::Sold,
                    "PUBLISHED" => ListingStatus::Listed,
                    "ENDED" => ListingStatus::Ended,
                    "UNPUBLISHED" => ListingStatus::Ended,
                    other => {
                        return Err(MarketplaceApiError::Rejected(format!(
                            "Unrecognized offer status: {other}"
                        )))
                    }
                })
            }
            reqwest::StatusCode::UNAUTHORIZED => Err(MarketplaceApiError::Unauthorized),
            reqwest::StatusCode::NOT_FOUND => Ok(ListingStatus::Ended),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(MarketplaceApiError::Rejected(body))
            }
        }
    }
}
