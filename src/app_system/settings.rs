use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::pricing::PricingRules;

pub const DEFAULT_CONFIG_FILE: &str = "storefront.toml";
pub const ENV_PREFIX: &str = "STOREFRONT";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilitySettings {
    /// Refresh period of the reconciler behind a cart and its checkout.
    pub cart_refresh_secs: u64,
    /// Refresh period of passive product badges.
    pub badge_refresh_secs: u64,
}

impl Default for AvailabilitySettings {
    fn default() -> Self {
        Self {
            cart_refresh_secs: 30,
            badge_refresh_secs: 60,
        }
    }
}

impl AvailabilitySettings {
    pub fn cart_interval(&self) -> Duration {
        Duration::from_secs(self.cart_refresh_secs)
    }

    pub fn badge_interval(&self) -> Duration {
        Duration::from_secs(self.badge_refresh_secs)
    }
}

/// Base URLs of the external services. Without them the in-memory
/// collaborators are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub inventory_url: Option<String>,
    pub orders_url: Option<String>,
    pub payments_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            inventory_url: None,
            orders_url: None,
            payments_url: None,
            timeout_secs: 10,
        }
    }
}

impl ServiceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorSettings {
    pub mailbox_size: usize,
}

impl Default for ActorSettings {
    fn default() -> Self {
        Self { mailbox_size: 32 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pricing: PricingRules,
    pub availability: AvailabilitySettings,
    pub services: ServiceSettings,
    pub actors: ActorSettings,
}

impl Settings {
    /// Loads settings from a TOML file and `STOREFRONT__*` environment
    /// variables, e.g. `STOREFRONT__PRICING__TAX_RATE=0.18`.
    ///
    /// Without an explicit path `storefront.toml` is read when present; a
    /// missing default file only logs a warning. An explicit path must exist.
    pub fn load(config_path: Option<&str>) -> Result<Self, SettingsError> {
        let (path, required) = match config_path {
            Some(path) => (path, true),
            None => (DEFAULT_CONFIG_FILE, false),
        };
        if !required && !Path::new(path).exists() {
            warn!(path, "Config file not found. Using default configuration.");
        }

        let settings = Config::builder()
            .add_source(File::with_name(path).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        settings.validate()?;
        info!(path, "Configuration loaded");
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.actors.mailbox_size == 0 {
            return Err(SettingsError::Invalid("actors.mailbox_size must be at least 1".into()));
        }
        if self.availability.cart_refresh_secs == 0 || self.availability.badge_refresh_secs == 0 {
            return Err(SettingsError::Invalid("availability refresh intervals must be positive".into()));
        }
        if self.pricing.tax_rate.is_sign_negative() {
            return Err(SettingsError::Invalid("pricing.tax_rate must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_the_storefront_rules() {
        let settings = Settings::default();
        assert_eq!(settings.pricing.free_shipping_threshold, Decimal::from(500));
        assert_eq!(settings.pricing.flat_shipping_fee, Decimal::from(40));
        assert_eq!(settings.availability.cart_interval(), Duration::from_secs(30));
        assert_eq!(settings.availability.badge_interval(), Duration::from_secs(60));
        assert!(settings.pricing.find_coupon("welcome10").is_some());
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
[pricing]
tax_rate = "0.18"

[availability]
cart_refresh_secs = 5

[services]
inventory_url = "http://inventory.local"
"#,
        );

        let settings = Settings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.pricing.tax_rate, Decimal::new(18, 2));
        assert_eq!(settings.pricing.flat_shipping_fee, Decimal::from(40));
        assert_eq!(settings.availability.cart_refresh_secs, 5);
        assert_eq!(settings.availability.badge_refresh_secs, 60);
        assert_eq!(settings.services.inventory_url.as_deref(), Some("http://inventory.local"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = Settings::load(Some("/nonexistent/storefront-settings.toml"));
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }

    #[test]
    fn zero_mailbox_is_rejected() {
        let file = write_config("[actors]\nmailbox_size = 0\n");
        assert!(matches!(
            Settings::load(file.path().to_str()),
            Err(SettingsError::Invalid(_))
        ));
    }
}
