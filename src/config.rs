//! Client configuration.
//!
//! Defaults match the stock deployment (local backend, INR checkout). Any
//! value stored in `local_settings` under the `client` category overrides
//! the default.

use rusqlite::Connection;
use std::time::Duration;
use tracing::info;

use crate::db;
use crate::error::ConfigError;

pub const SETTINGS_CATEGORY: &str = "client";

const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_THEME_COLOR: &str = "#3399cc";
const DEFAULT_DESCRIPTION: &str = "Table order";

/// Default timeout for backend requests (30 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the confirmation stays visible before returning to landing.
const DEFAULT_CONFIRMATION_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub backend_url: String,
    /// Publishable key handed to the checkout widget.
    pub gateway_key: String,
    pub currency: String,
    /// Merchant label shown in the widget; falls back to the customer name.
    pub merchant_name: Option<String>,
    pub description: String,
    pub prefill_email: Option<String>,
    pub theme_color: String,
    pub request_timeout: Duration,
    pub confirmation_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            gateway_key: String::new(),
            currency: DEFAULT_CURRENCY.to_string(),
            merchant_name: None,
            description: DEFAULT_DESCRIPTION.to_string(),
            prefill_email: None,
            theme_color: DEFAULT_THEME_COLOR.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            confirmation_delay: DEFAULT_CONFIRMATION_DELAY,
        }
    }
}

impl ClientConfig {
    /// Overlay stored settings on the defaults.
    pub fn load(conn: &Connection) -> Result<Self, ConfigError> {
        let mut cfg = ClientConfig::default();
        let get = |key: &str| {
            db::get_setting(conn, SETTINGS_CATEGORY, key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("backend_url") {
            cfg.backend_url = normalize_backend_url(&url);
        }
        if let Some(key) = get("gateway_key") {
            cfg.gateway_key = key;
        }
        if let Some(currency) = get("currency") {
            cfg.currency = currency.to_ascii_uppercase();
        }
        cfg.merchant_name = get("merchant_name");
        if let Some(description) = get("description") {
            cfg.description = description;
        }
        cfg.prefill_email = get("prefill_email");
        if let Some(color) = get("theme_color") {
            cfg.theme_color = color;
        }
        if let Some(raw) = get("request_timeout_secs") {
            cfg.request_timeout = parse_secs("request_timeout_secs", &raw)?;
        }
        if let Some(raw) = get("confirmation_delay_ms") {
            let ms = raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "confirmation_delay_ms".into(),
                value: raw.clone(),
            })?;
            cfg.confirmation_delay = Duration::from_millis(ms);
        }

        info!(backend_url = %cfg.backend_url, currency = %cfg.currency, "client config loaded");
        Ok(cfg)
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Normalise the backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_backend_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}
