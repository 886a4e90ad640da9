//! Amazon marketplace adapter: LWA OAuth driver and SP-API listing client.
//!
//! Amazon access tokens are short-lived; the client exchanges the refresh
//! token for a fresh access token when its cached one lapses and reports
//! the rotation through the credential sink so storage stays current.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::config::MarketplaceAppConfig;
use crate::domain::account::Marketplace;
use crate::domain::listing::{CanonicalListing, ListingStatus};
use crate::ports::{
    CredentialSink, LiveCredentials, MarketplaceApiError, MarketplaceClient,
    MarketplaceClientFactory, MarketplaceOAuthDriver, OAuthError, RemoteListing, TokenGrant,
};

use super::{build_url, network_api_error, network_oauth_error};

const AUTH_URL: &str = "https://sellercentral.amazon.com/apps/authorize/consent";
const LWA_TOKEN_URL: &str = "https://api.amazon.com/auth/o2/token";
const LIVE_API_URL: &str = "https://sellingpartnerapi-na.amazon.com";
const SANDBOX_API_URL: &str = "https://sandbox.sellingpartnerapi-na.amazon.com";

/// Refresh the cached access token this long before it actually expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Clone)]
pub struct AmazonConfig {
    app_id: String,
    app_secret: SecretString,
    redirect_uri: String,
    auth_base_url: String,
    token_base_url: String,
    api_base_url: String,
}

impl AmazonConfig {
    pub fn new(config: &MarketplaceAppConfig) -> Self {
        Self {
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_base_url: AUTH_URL.to_string(),
            token_base_url: LWA_TOKEN_URL.to_string(),
            api_base_url: if config.sandbox {
                SANDBOX_API_URL.to_string()
            } else {
                LIVE_API_URL.to_string()
            },
        }
    }

    /// Points every endpoint at a custom base URL (for tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.auth_base_url = format!("{url}/consent");
        self.token_base_url = format!("{url}/auth/o2/token");
        self.api_base_url = url;
        self
    }

    fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.expose_secret().is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct LwaTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SellerParticipation {
    #[serde(rename = "sellerId")]
    seller_id: String,
}

async fn lwa_token(
    http: &reqwest::Client,
    config: &AmazonConfig,
    form: &[(&str, &str)],
) -> Result<LwaTokenResponse, OAuthError> {
    let response = http
        .post(&config.token_base_url)
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

pub struct AmazonOAuthDriver {
    config: AmazonConfig,
    http: reqwest::Client,
}

impl AmazonOAuthDriver {
    pub fn new(config: AmazonConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn fetch_seller_id(&self, access_token: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .get(format!(
                "{}/sellers/v1/marketplaceParticipations",
                self.config.api_base_url
            ))
            .header("x-amz-access-token", access_token)
            .send()
            .await
            .map_err(network_oauth_error)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::ExchangeRejected(body));
        }

        let participation: SellerParticipation =
            response.json().await.map_err(network_oauth_error)?;
        Ok(participation.seller_id)
    }

    fn grant_from(&self, token: LwaTokenResponse, remote_account_id: String) -> TokenGrant {
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
impl MarketplaceOAuthDriver for AmazonOAuthDriver {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Amazon
    }

    fn auth_url(&self, state: &str) -> Result<String, OAuthError> {
        if !self.config.is_configured() {
            return Err(OAuthError::NotConfigured(Marketplace::Amazon));
        }
        build_url(
            &self.config.auth_base_url,
            &[
                ("application_id", self.config.app_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError> {
        if !self.config.is_configured() {
            return Err(OAuthError::NotConfigured(Marketplace::Amazon));
        }
        let token = lwa_token(
            &self.http,
            &self.config,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.config.redirect_uri),
                ("client_id", &self.config.app_id),
                ("client_secret", self.config.app_secret.expose_secret()),
            ],
        )
        .await?;
        let seller_id = self.fetch_seller_id(&token.access_token).await?;
        Ok(self.grant_from(token, seller_id))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        let token = lwa_token(
            &self.http,
            &self.config,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.config.app_id),
                ("client_secret", self.config.app_secret.expose_secret()),
            ],
        )
        .await
        .map_err(|e| match e {
            OAuthError::ExchangeRejected(msg) => OAuthError::RefreshRejected(msg),
            other => other,
        })?;
        let seller_id = self.fetch_seller_id(&token.access_token).await?;
        Ok(self.grant_from(token, seller_id))
    }

    // LWA has no revocation endpoint; disconnection is local only.
    async fn revoke(&self, _access_token: &str) -> Result<(), OAuthError> {
        Ok(())
    }
}

pub struct AmazonClientFactory {
    config: AmazonConfig,
}

impl AmazonClientFactory {
    pub fn new(config: AmazonConfig) -> Self {
        Self { config }
    }
}

impl MarketplaceClientFactory for AmazonClientFactory {
    fn client(
        &self,
        credentials: LiveCredentials,
        sink: Arc<dyn CredentialSink>,
    ) -> Arc<dyn MarketplaceClient> {
        Arc::new(AmazonClient {
            config: self.config.clone(),
            http: reqwest::Client::new(),
            sink,
            state: Mutex::new(ClientState {
                account_id: credentials.account_id,
                access_token: credentials.access_token,
                refresh_token: credentials.refresh_token,
                expires_at: None,
            }),
        })
    }
}

struct ClientState {
    account_id: crate::domain::foundation::AccountId,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

pub struct AmazonClient {
    config: AmazonConfig,
    http: reqwest::Client,
    sink: Arc<dyn CredentialSink>,
    state: Mutex<ClientState>,
}

impl AmazonClient {
    /// Returns a usable access token, rotating through LWA when the cached
    /// one is stale. Rotations are reported to the sink; a sink failure is
    /// logged, not fatal, since the call can still proceed.
    async fn access_token(&self) -> Result<String, MarketplaceApiError> {
        let mut state = self.state.lock().await;

        let fresh = state.expires_at.is_none_or(|at| {
            at > Utc::now() + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)
        });
        if fresh && state.expires_at.is_some() {
            return Ok(state.access_token.clone());
        }
        let Some(refresh_token) = state.refresh_token.clone() else {
            // No refresh token: use the stored access token as-is.
            return Ok(state.access_token.clone());
        };

        let token = lwa_token(
            &self.http,
            &self.config,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
                ("client_id", &self.config.app_id),
                ("client_secret", self.config.app_secret.expose_secret()),
            ],
        )
        .await
        .map_err(|e| MarketplaceApiError::Network(e.to_string()))?;

        state.access_token = token.access_token.clone();
        state.expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        if let Some(new_refresh) = &token.refresh_token {
            state.refresh_token = Some(new_refresh.clone());
        }

        let grant = TokenGrant {
            access_token: state.access_token.clone(),
            refresh_token: state.refresh_token.clone(),
            expires_at: state.expires_at,
            remote_account_id: String::new(),
        };
        if let Err(e) = self.sink.persist_rotated(state.account_id, grant).await {
            tracing::warn!(
                account_id = %state.account_id,
                error = %e,
                "Failed to persist rotated Amazon token"
            );
        }

        Ok(state.access_token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ListingSubmission {
    #[serde(rename = "submissionId")]
    submission_id: String,
}

#[derive(Debug, Deserialize)]
struct ListingSummary {
    status: String,
}

#[async_trait]
impl MarketplaceClient for AmazonClient {
    async fn publish_listing(
        &self,
        listing: &CanonicalListing,
    ) -> Result<RemoteListing, MarketplaceApiError> {
        let token = self.access_token().await?;
        let body = json!({
            "productType": "PRODUCT",
            "attributes": {
                "item_name": [{ "value": listing.title }],
                "product_description": [{ "value": listing.description }],
                "list_price": [{
                    "value": listing.price_cents as f64 / 100.0,
                    "currency": listing.currency,
                }],
                "fulfillment_availability": [{ "quantity": listing.quantity }],
            },
            "custom": listing.attributes,
        });

        let response = self
            .http
            .put(format!(
                "{}/listings/2021-08-01/items/{}",
                self.config.api_base_url, listing.item_id
            ))
            .header("x-amz-access-token", &token)
            .json(&body)
            .send()
            .await
            .map_err(network_api_error)?;

        match response.status() {
            status if status.is_success() => {
                let submission: ListingSubmission =
                    response.json().await.map_err(network_api_error)?;
                Ok(RemoteListing {
                    remote_listing_id: submission.submission_id,
                    remote_url: None,
                })
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(MarketplaceApiError::Unauthorized)
            }
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
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!(
                "{}/listings/2021-08-01/items/{remote_listing_id}",
                self.config.api_base_url
            ))
            .header("x-amz-access-token", &token)
            .send()
            .await
            .map_err(network_api_error)?;

        match response.status() {
            status if status.is_success() => {
                let summary: ListingSummary =
                    response.json().await.map_err(network_api_error)?;
                Ok(match summary.status.as_str() {
                    "BUYABLE" | "DISCOVERABLE" => ListingStatus::Listed,
                    "SOLD_OUT" => ListingStatus::Sold,
                    "DELETED" | "CLOSED" => ListingStatus::Ended,
                    other => {
                        return Err(MarketplaceApiError::Rejected(format!(
                            "Unrecognized listing status: {other}"
                        )))
                    }
                })
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(MarketplaceApiError::Unauthorized)
            }
            reqwest::StatusCode::NOT_FOUND => Ok(ListingStatus::Ended),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(MarketplaceApiError::Rejected(body))
            }
        }
    }
}
