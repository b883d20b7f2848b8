//! Market configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! min_bid = 1
//! min_transfer_amount = 50
//! currency = "usd"
//!
//! [fees]
//! processor_rate = "0.029"
//! processor_fixed = 30
//! platform_rate = "0.01"
//!
//! [gateway]
//! base_url = "https://payments.example.com/v1"
//! api_key = "sk_test_..."
//! timeout_secs = 15
//!
//! [notify]
//! timeout_secs = 5
//! ```

use serde::{Deserialize, Serialize};

use crate::fees::FeeSchedule;

/// Pattern a query gets when none is supplied. Matches any text.
pub const DEFAULT_REGEX: &str = r"^.*$";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Smallest bid a query may carry.
    pub min_bid: u64,
    /// Bid used when a query does not specify one.
    pub default_bid: u64,
    /// Smallest gross amount accepted for deposits, transfers and payouts.
    pub min_transfer_amount: u64,
    /// ISO 4217 currency code sent to the payment gateway.
    pub currency: String,
    pub fees: FeeSchedule,
    pub gateway: GatewayConfig,
    pub notify: NotifyConfig,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            min_bid: 1,
            default_bid: 1,
            min_transfer_amount: 50,
            currency: "usd".to_string(),
            fees: FeeSchedule::default(),
            gateway: GatewayConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl MarketConfig {
    /// Check cross-field constraints. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.min_bid == 0 {
            errors.push("min_bid must be at least 1".to_string());
        }
        if self.default_bid < self.min_bid {
            errors.push(format!(
                "default_bid ({}) is below min_bid ({})",
                self.default_bid, self.min_bid
            ));
        }
        if self.min_transfer_amount == 0 {
            errors.push("min_transfer_amount must be at least 1".to_string());
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push(format!(
                "currency must be a 3-letter code, got '{}'",
                self.currency
            ));
        }
        if let Err(e) = self.fees.validate() {
            errors.push(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Apply `PARLEY_GATEWAY_URL` and `PARLEY_GATEWAY_API_KEY` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PARLEY_GATEWAY_URL") {
            if !url.is_empty() {
                self.gateway.base_url = Some(url);
            }
        }
        if let Ok(key) = std::env::var("PARLEY_GATEWAY_API_KEY") {
            if !key.is_empty() {
                self.gateway.api_key = Some(key);
            }
        }
    }
}

/// Connection settings for the HTTP payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Per-callback HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}
