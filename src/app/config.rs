use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::app::error::CheckoutError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_port: u16,
    pub provider_charge_url: String,
    pub provider_verify_url: String,
    pub telemetry_base_url: String,
    pub delivery_url: String,
    pub product_title: String,
    pub currency: String,
    pub expiry_secs: u64,
    pub bonus_window_secs: u64,
    pub poll_interval_secs: u64,
    pub redirect_delay_ms: u64,
    pub auto_return_after_failures: u32,
    pub auto_return_delay_ms: u64,
    pub idle_timeout_secs: u64,
    pub http_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 9999,
            provider_charge_url: "https://api-checkoutinho.up.railway.app/charge".to_string(),
            provider_verify_url: "https://api-checkoutinho.up.railway.app/verify".to_string(),
            telemetry_base_url: "http://127.0.0.1:9999".to_string(),
            delivery_url: "https://premiumespiao.netlify.app/?loaded=true".to_string(),
            product_title: "Whats Espião Acesso".to_string(),
            currency: "BRL".to_string(),
            expiry_secs: 15 * 60,
            bonus_window_secs: 3 * 60,
            poll_interval_secs: 5,
            redirect_delay_ms: 2000,
            auto_return_after_failures: 3,
            auto_return_delay_ms: 3000,
            idle_timeout_secs: 30 * 60,
            http_timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads a TOML file and then applies environment overrides on top of it.
    /// The result is not validated; callers run [`Config::validate`].
    pub fn from_file(path: &Path) -> Result<Self, CheckoutError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CheckoutError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_toml_str(&raw)?.with_env_overrides())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CheckoutError> {
        toml::from_str(raw).map_err(|e| CheckoutError::Config(e.to_string()))
    }

    fn with_env_overrides(self) -> Self {
        Self {
            server_port: env_parse("PORT", self.server_port),
            provider_charge_url: env_string("PROVIDER_CHARGE_URL", self.provider_charge_url),
            provider_verify_url: env_string("PROVIDER_VERIFY_URL", self.provider_verify_url),
            telemetry_base_url: env_string("TELEMETRY_BASE_URL", self.telemetry_base_url),
            delivery_url: env_string("DELIVERY_URL", self.delivery_url),
            product_title: env_string("PRODUCT_TITLE", self.product_title),
            currency: env_string("CURRENCY", self.currency),
            expiry_secs: env_parse("EXPIRY_SECS", self.expiry_secs),
            bonus_window_secs: env_parse("BONUS_WINDOW_SECS", self.bonus_window_secs),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", self.poll_interval_secs),
            redirect_delay_ms: env_parse("REDIRECT_DELAY_MS", self.redirect_delay_ms),
            auto_return_after_failures: env_parse(
                "AUTO_RETURN_AFTER_FAILURES",
                self.auto_return_after_failures,
            ),
            auto_return_delay_ms: env_parse("AUTO_RETURN_DELAY_MS", self.auto_return_delay_ms),
            idle_timeout_secs: env_parse("SESSION_IDLE_TIMEOUT_SECS", self.idle_timeout_secs),
            http_timeout_ms: env_parse("HTTP_TIMEOUT_MS", self.http_timeout_ms),
        }
    }

    pub fn validate(&self) -> Result<(), CheckoutError> {
        if self.expiry_secs == 0 {
            return Err(CheckoutError::Config("expiry_secs must be greater than zero".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(CheckoutError::Config(
                "poll_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            expiry_secs: self.expiry_secs,
            bonus_window_secs: self.bonus_window_secs,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            redirect_delay: Duration::from_millis(self.redirect_delay_ms),
            auto_return_after_failures: self.auto_return_after_failures,
            auto_return_delay: Duration::from_millis(self.auto_return_delay_ms),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            delivery_url: self.delivery_url.clone(),
        }
    }
}

/// The subset of configuration a single payment session needs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub expiry_secs: u64,
    /// `0` disables the bonus sub-timer.
    pub bonus_window_secs: u64,
    pub poll_interval: Duration,
    pub redirect_delay: Duration,
    /// `0` disables the automatic return to order entry.
    pub auto_return_after_failures: u32,
    pub auto_return_delay: Duration,
    /// How long a session may sit in `expired` or `error` before it is dropped.
    /// Zero keeps it forever.
    pub idle_timeout: Duration,
    pub delivery_url: String,
}

fn env_string(key: &str, fallback: String) -> String {
    env::var(key).unwrap_or(fallback)
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
