//! Facebook marketplace adapter: Graph API OAuth driver and commerce client.
//!
//! Facebook issues long-lived user tokens with no refresh token; "refresh"
//! is the fb_exchange_token grant run against the current access token, so
//! the driver's refresh input is the access token the service stored.

use std::sync::Arc;

use async_trait::async_trait;
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

const AUTH_URL: &str = "https://www.facebook.com/v19.0/dialog/oauth";
const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

const SCOPES: &str = "catalog_management,commerce_account_read_orders";

#[derive(Clone)]
pub struct FacebookConfig {
    app_id: String,
    app_secret: SecretString,
    redirect_uri: String,
    auth_base_url: String,
    graph_base_url: String,
}

impl FacebookConfig {
    pub fn new(config: &MarketplaceAppConfig) -> Self {
        Self {
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_base_url: AUTH_URL.to_string(),
            graph_base_url: GRAPH_URL.to_string(),
        }
    }

    /// Points both dialog and Graph calls at a custom base URL (for tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.auth_base_url = format!("{url}/dialog/oauth");
        self.graph_base_url = url;
        self
    }

    fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.expose_secret().is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct GraphTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    id: String,
}

pub struct FacebookOAuthDriver {
    config: FacebookConfig,
    http: reqwest::Client,
}

impl FacebookOAuthDriver {
    pub fn new(config: FacebookConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn token_request(
        &self,
        query: &[(&str, &str)],
    ) -> Result<GraphTokenResponse, OAuthError> {
        let response = self
            .http
            .get(format!("{}/oauth/access_token", self.config.graph_base_url))
            .query(query)
            .send()
            .await
            .map_err(network_oauth_error)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::ExchangeRejected(body));
        }

        response.json().await.map_err(network_oauth_error)
    }

    async fn fetch_user_id(&self, access_token: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .get(format!("{}/me", self.config.graph_base_url))
            .query(&[("fields", "id"), ("access_token", access_token)])
            .send()
            .await
            .map_err(network_oauth_error)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::ExchangeRejected(body));
        }

        let me: MeResponse = response.json().await.map_err(network_oauth_error)?;
        Ok(me.id)
    }

    fn grant_from(&self, token: GraphTokenResponse, remote_account_id: String) -> TokenGrant {
        TokenGrant {
            // Graph tokens have no separate refresh token; the access token
            // itself is the fb_exchange_token input, so it is stored in the
            // refresh slot too and the uniform refresh path works unchanged.
            refresh_token: Some(token.access_token.clone()),
            access_token: token.access_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            remote_account_id,
        }
    }
}

#[async_trait]
impl MarketplaceOAuthDriver for FacebookOAuthDriver {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Facebook
    }

    fn auth_url(&self, state: &str) -> Result<String, OAuthError> {
        if !self.config.is_configured() {
            return Err(OAuthError::NotConfigured(Marketplace::Facebook));
        }
        build_url(
            &self.config.auth_base_url,
            &[
                ("client_id", self.config.app_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError> {
        if !self.config.is_configured() {
            return Err(OAuthError::NotConfigured(Marketplace::Facebook));
        }
        // Short-lived token first, immediately upgraded to the long-lived
        // form so the stored credential survives past an hour.
        let short = self
            .token_request(&[
                ("client_id", self.config.app_id.as_str()),
                ("client_secret", self.config.app_secret.expose_secret()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
            ])
            .await?;
        let long = self.exchange_for_long_lived(&short.access_token).await?;
        let user_id = self.fetch_user_id(&long.access_token).await?;
        Ok(self.grant_from(long, user_id))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        let token = self
            .exchange_for_long_lived(refresh_token)
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
            .delete(format!("{}/me/permissions", self.config.graph_base_url))
            .query(&[("access_token", access_token)])
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

impl FacebookOAuthDriver {
    async fn exchange_for_long_lived(
        &self,
        access_token: &str,
    ) -> Result<GraphTokenResponse, OAuthError> {
        self.token_request(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_secret.expose_secret()),
            ("fb_exchange_token", access_token),
        ])
        .await
    }
}

pub struct FacebookClientFactory {
    config: FacebookConfig,
}

impl FacebookClientFactory {
    pub fn new(config: FacebookConfig) -> Self {
        Self { config }
    }
}

impl MarketplaceClientFactory for FacebookClientFactory {
    // Long-lived tokens do not rotate mid-call; the sink goes unused here.
    fn client(
        &self,
        credentials: LiveCredentials,
        _sink: Arc<dyn CredentialSink>,
    ) -> Arc<dyn MarketplaceClient> {
        Arc::new(FacebookClient {
            config: self.config.clone(),
            credentials,
            http: reqwest::Client::new(),
        })
    }
}

pub struct FacebookClient {
    config: FacebookConfig,
    credentials: LiveCredentials,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CreateListingResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListingNode {
    availability: Option<String>,
}

#[async_trait]
impl MarketplaceClient for FacebookClient {
    async fn publish_listing(
        &self,
        listing: &CanonicalListing,
    ) -> Result<RemoteListing, MarketplaceApiError> {
        let body = json!({
            "name": listing.title,
            "description": listing.description,
            "price": listing.price_cents,
            "currency": listing.currency,
            "quantity_to_sell_on_facebook": listing.quantity,
            "retailer_id": listing.item_id,
            "additional_attributes": listing.attributes,
        });

        let response = self
            .http
            .post(format!("{}/me/products", self.config.graph_base_url))
            .query(&[("access_token", self.credentials.access_token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(network_api_error)?;

        match response.status() {
            status if status.is_success() => {
                let created: CreateListingResponse =
                    response.json().await.map_err(network_api_error)?;
                Ok(RemoteListing {
                    remote_listing_id: created.id,
                    remote_url: None,
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
            .get(format!("{}/{remote_listing_id}", self.config.graph_base_url))
            .query(&[
                ("fields", "availability"),
                ("access_token", self.credentials.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(network_api_error)?;

        match response.status() {
            status if status.is_success() => {
                let node: ListingNode = response.json().await.map_err(network_api_error)?;
                Ok(match node.availability.as_deref() {
                    Some("in stock") | None => ListingStatus::Listed,
                    Some("out of stock") => ListingStatus::Sold,
                    Some(_) => ListingStatus::Ended,
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
