//! Security configuration: credential encryption key and OAuth state secret.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::Environment;

/// Security configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// 32-byte key for AES-256-GCM credential encryption at rest
    #[serde(default = "empty_secret")]
    pub encryption_key: SecretString,

    /// HMAC secret for signed OAuth state. Falls back to `app_secret`
    /// when unset; that fallback is rejected in production.
    #[serde(default)]
    pub state_secret: Option<SecretString>,

    /// Generic application secret (fallback signer outside production)
    #[serde(default = "empty_secret")]
    pub app_secret: SecretString,
}

impl SecurityConfig {
    /// The secret used to sign OAuth state.
    pub fn state_signing_secret(&self) -> SecretString {
        match &self.state_secret {
            Some(s) => s.clone(),
            None => self.app_secret.clone(),
        }
    }

    /// Validate security configuration.
    ///
    /// The encryption key itself is checked at boot by
    /// `crypto::validate_key_configuration`, which is fatal only in
    /// production; this validation covers the state secret policy.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if *environment == Environment::Production {
            if self.state_secret.is_none() {
                return Err(ValidationError::StateSecretRequired);
            }
            let key_len = self.encryption_key.expose_secret().len();
            if key_len != 32 {
                return Err(ValidationError::InvalidEncryptionKey);
            }
        }
        Ok(())
    }
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}
