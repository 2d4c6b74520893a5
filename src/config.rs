//! Environment-driven configuration
//!
//! Provider credentials are optional: a deployment may run with only one
//! provider (or none, for free-only content), and an unconfigured gateway
//! reports `ProviderUnavailable` at call time rather than failing startup.
//! Partial credentials, on the other hand, are a deployment mistake and
//! fail fast.

use std::env;

use thiserror::Error;

use crate::provider::{CardCredentials, MobileMoneyCredentials};

/// Configuration fault raised by [`EngineConfig::from_env`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
    #[error("incomplete provider configuration: {missing} is required when {present} is set")]
    Incomplete { present: String, missing: String },
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on any single provider call, in seconds
    pub provider_timeout_secs: u64,
    /// Currency the public forms default to
    pub default_currency: String,
    pub card: Option<CardCredentials>,
    pub mobile_money: Option<MobileMoneyCredentials>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            provider_timeout_secs: 30,
            default_currency: "USD".to_string(),
            card: None,
            mobile_money: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment
    ///
    /// Recognized variables:
    ///
    /// * `PROVIDER_TIMEOUT_SECS` (default 30)
    /// * `DEFAULT_CURRENCY` (default `USD`)
    /// * `CARD_SECRET_KEY`, `CARD_BASE_URL` (default production API URL)
    /// * `MOBILE_MONEY_CONSUMER_KEY`, `MOBILE_MONEY_CONSUMER_SECRET`,
    ///   `MOBILE_MONEY_SHORTCODE`, `MOBILE_MONEY_PASSKEY`,
    ///   `MOBILE_MONEY_CALLBACK_URL`, `MOBILE_MONEY_BASE_URL` (default
    ///   production API URL)
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider_timeout_secs = match env::var("PROVIDER_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "PROVIDER_TIMEOUT_SECS".to_string(),
                message: format!("'{raw}' is not a number of seconds"),
            })?,
            Err(_) => 30,
        };

        let card = match env::var("CARD_SECRET_KEY") {
            Ok(secret_key) => Some(CardCredentials {
                secret_key,
                base_url: env::var("CARD_BASE_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            }),
            Err(_) => None,
        };

        let mobile_money = match env::var("MOBILE_MONEY_CONSUMER_KEY") {
            Ok(consumer_key) => Some(MobileMoneyCredentials {
                consumer_key,
                consumer_secret: require_with("MOBILE_MONEY_CONSUMER_SECRET", "MOBILE_MONEY_CONSUMER_KEY")?,
                shortcode: require_with("MOBILE_MONEY_SHORTCODE", "MOBILE_MONEY_CONSUMER_KEY")?,
                passkey: require_with("MOBILE_MONEY_PASSKEY", "MOBILE_MONEY_CONSUMER_KEY")?,
                callback_url: require_with("MOBILE_MONEY_CALLBACK_URL", "MOBILE_MONEY_CONSUMER_KEY")?,
                base_url: env::var("MOBILE_MONEY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.safaricom.co.ke".to_string()),
            }),
            Err(_) => None,
        };

        Ok(EngineConfig {
            provider_timeout_secs,
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
            card,
            mobile_money,
        })
    }
}

fn require_with(key: &str, present: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Incomplete {
        present: present.to_string(),
        missing: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.provider_timeout_secs, 30);
        assert_eq!(config.default_currency, "USD");
        assert!(config.card.is_none());
        assert!(config.mobile_money.is_none());
    }

    #[test]
    fn test_incomplete_error_display() {
        let error = ConfigError::Incomplete {
            present: "MOBILE_MONEY_CONSUMER_KEY".to_string(),
            missing: "MOBILE_MONEY_PASSKEY".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "incomplete provider configuration: MOBILE_MONEY_PASSKEY is required when MOBILE_MONEY_CONSUMER_KEY is set"
        );
    }
}
