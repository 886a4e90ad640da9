//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Configuration is loaded with the
//! `MARKETSYNC` prefix; nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use marketsync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod marketplace;
mod security;
mod server;
mod sweeps;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use marketplace::{MarketplaceAppConfig, MarketplacesConfig};
pub use security::SecurityConfig;
pub use server::{Environment, ServerConfig};
pub use sweeps::SweepConfig;

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Security configuration (encryption key, state signing secret)
    pub security: SecurityConfig,

    /// Per-marketplace OAuth app credentials and webhook secrets
    #[serde(default)]
    pub marketplaces: MarketplacesConfig,

    /// Background sweep tuning
    #[serde(default)]
    pub sweeps: SweepConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Loads `.env` if present (development), then reads variables with the
    /// `MARKETSYNC` prefix, e.g. `MARKETSYNC__DATABASE__URL`,
    /// `MARKETSYNC__MARKETPLACES__EBAY__APP_ID`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("MARKETSYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.security.validate(&self.server.environment)?;
        self.marketplaces.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
