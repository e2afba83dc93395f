//! SDK configuration and app credentials.
//!
//! # Sources
//!
//! Configuration can come from three places, merged in this order:
//!
//! 1. [`Config::default`] - the vendor's documented defaults
//! 2. A JSON file ([`Config::from_json_file`]) - unknown keys are rejected
//! 3. Environment variables ([`Config::from_env`], prefix `WAVECART_`) -
//!    also used as fallback for keys absent from a JSON file
//!    ([`Config::from_json_file_with_env`])
//!
//! # Environment Variables
//!
//! - `WAVECART_APP_ID` / `WAVECART_APP_TOKEN` / `WAVECART_APP_SECRET` - credentials
//! - `WAVECART_ENTRY_POINT_URL` - shop API endpoint
//! - `WAVECART_AGENT` - User-Agent header value
//! - `WAVECART_IMAGE_URL` / `WAVECART_PRODUCT_URL` / `WAVECART_SHOP_URL` - URL templates
//! - `WAVECART_AUTO_FETCH` - `true`/`false`, lazy product hydration
//! - `WAVECART_REQUEST_TIMEOUT_SECS` - HTTP request timeout
//! - `WAVECART_CACHE_TTL_SECS` - TTL for external cache writes (enables the cache section)

use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_ENTRY_POINT_URL: &str = "http://ant-shop-api1.wavecloud.de/api";
const DEFAULT_AGENT: &str = "Wavecart-Shop-SDK-Rust";
const DEFAULT_IMAGE_URL: &str = "http://cdn.mary-paul.de/file/{}";
const DEFAULT_PRODUCT_URL: &str = "http://www.aboutyou.de/{}";
const DEFAULT_SHOP_URL: &str = "https://checkout.aboutyou.de/";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// App credentials for the shop API.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct Credentials {
    /// The application id.
    pub app_id: String,
    /// The token for the corresponding application id.
    pub app_token: SecretString,
    /// The application secret, only needed for signed requests.
    pub app_secret: Option<SecretString>,
}

impl Credentials {
    /// Create credentials from an app id and token.
    #[must_use]
    pub fn new(app_id: impl Into<String>, app_token: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_token: SecretString::from(app_token.into()),
            app_secret: None,
        }
    }

    /// Attach the app secret.
    #[must_use]
    pub fn with_secret(mut self, app_secret: impl Into<String>) -> Self {
        self.app_secret = Some(SecretString::from(app_secret.into()));
        self
    }

    /// Load credentials from `WAVECART_APP_ID` / `WAVECART_APP_TOKEN` /
    /// `WAVECART_APP_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if id or token are unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let app_id = get_required_env("WAVECART_APP_ID")?;
        let app_token = get_required_env("WAVECART_APP_TOKEN")?;
        let mut credentials = Self::new(app_id, app_token);
        if let Some(secret) = get_optional_env("WAVECART_APP_SECRET") {
            credentials = credentials.with_secret(secret);
        }
        Ok(credentials)
    }

    /// Content for the `Authorization` header:
    /// `Basic base64(app_id:app_token)`.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.app_id, self.app_token.expose_secret());
        format!("Basic {}", BASE64.encode(raw))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_token", &"[REDACTED]")
            .field(
                "app_secret",
                &self.app_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// External cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for cache writes.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Configuration of a shop API connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// The shop API endpoint.
    pub entry_point_url: String,
    /// Value for the `User-Agent` header.
    pub agent: String,
    /// Template for image URLs; `{}` is replaced with the image hash.
    pub image_url: String,
    /// Template for product URLs; `{}` is replaced with the product slug.
    pub product_url: String,
    /// Base URL of the checkout shop.
    pub shop_url: String,
    /// When true, accessing an absent product field fetches it on demand.
    /// When false the access fails with `Error::FieldNotLoaded`.
    pub auto_fetch: bool,
    /// HTTP request timeout. Timeouts surface as `Error::Transport`.
    pub request_timeout: Duration,
    /// External cache settings; `None` leaves cache writes TTL at the
    /// backend default.
    pub cache: Option<CacheConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry_point_url: DEFAULT_ENTRY_POINT_URL.to_string(),
            agent: DEFAULT_AGENT.to_string(),
            image_url: DEFAULT_IMAGE_URL.to_string(),
            product_url: DEFAULT_PRODUCT_URL.to_string(),
            shop_url: DEFAULT_SHOP_URL.to_string(),
            auto_fetch: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cache: None,
        }
    }
}

/// On-disk / environment representation of [`Config`]. Every key is
/// optional; unset keys fall back to the defaults (or to the environment,
/// see [`Config::from_json_file_with_env`]). Unknown keys are rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    entry_point_url: Option<String>,
    agent: Option<String>,
    image_url: Option<String>,
    product_url: Option<String>,
    shop_url: Option<String>,
    auto_fetch: Option<bool>,
    request_timeout_secs: Option<u64>,
    cache_ttl_secs: Option<u64>,
}

impl ConfigOverlay {
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            entry_point_url: get_optional_env("WAVECART_ENTRY_POINT_URL"),
            agent: get_optional_env("WAVECART_AGENT"),
            image_url: get_optional_env("WAVECART_IMAGE_URL"),
            product_url: get_optional_env("WAVECART_PRODUCT_URL"),
            shop_url: get_optional_env("WAVECART_SHOP_URL"),
            auto_fetch: parse_optional_env("WAVECART_AUTO_FETCH")?,
            request_timeout_secs: parse_optional_env("WAVECART_REQUEST_TIMEOUT_SECS")?,
            cache_ttl_secs: parse_optional_env("WAVECART_CACHE_TTL_SECS")?,
        })
    }

    /// Fill unset keys from `other`.
    fn or(self, other: Self) -> Self {
        Self {
            entry_point_url: self.entry_point_url.or(other.entry_point_url),
            agent: self.agent.or(other.agent),
            image_url: self.image_url.or(other.image_url),
            product_url: self.product_url.or(other.product_url),
            shop_url: self.shop_url.or(other.shop_url),
            auto_fetch: self.auto_fetch.or(other.auto_fetch),
            request_timeout_secs: self.request_timeout_secs.or(other.request_timeout_secs),
            cache_ttl_secs: self.cache_ttl_secs.or(other.cache_ttl_secs),
        }
    }

    fn apply(self) -> Config {
        let mut config = Config::default();
        if let Some(v) = self.entry_point_url {
            config.entry_point_url = v;
        }
        if let Some(v) = self.agent {
            config.agent = v;
        }
        if let Some(v) = self.image_url {
            config.image_url = v;
        }
        if let Some(v) = self.product_url {
            config.product_url = v;
        }
        if let Some(v) = self.shop_url {
            config.shop_url = v;
        }
        if let Some(v) = self.auto_fetch {
            config.auto_fetch = v;
        }
        if let Some(v) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.cache_ttl_secs {
            config.cache = Some(CacheConfig {
                ttl: Duration::from_secs(v),
            });
        }
        config
    }
}

impl Config {
    /// Load configuration from a JSON file. Keys absent from the file keep
    /// their defaults; unknown keys are a `ConfigError`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(ConfigOverlay::from_file(path.as_ref())?.apply())
    }

    /// Load configuration from `WAVECART_*` environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from a `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a set variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(ConfigOverlay::from_env()?.apply())
    }

    /// Load configuration from a JSON file with environment-variable
    /// fallback: keys absent from the file are taken from `WAVECART_*`
    /// variables before defaulting.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the file cannot be read or parsed, or a
    /// set variable fails to parse.
    pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let file = ConfigOverlay::from_file(path.as_ref())?;
        Ok(file.or(ConfigOverlay::from_env()?).apply())
    }

    /// TTL used for external cache writes.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache
            .as_ref()
            .map_or(DEFAULT_CACHE_TTL, |cache| cache.ttl)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_optional_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.entry_point_url, DEFAULT_ENTRY_POINT_URL);
        assert!(config.auto_fetch);
        assert!(config.cache.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_authorization_header() {
        // base64("110:token") == "MTEwOnRva2Vu"
        let credentials = Credentials::new("110", "token");
        assert_eq!(credentials.authorization_header(), "Basic MTEwOnRva2Vu");
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let credentials = Credentials::new("110", "super_secret_token").with_secret("sssh");
        let debug_output = format!("{credentials:?}");

        assert!(debug_output.contains("110"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_token"));
        assert!(!debug_output.contains("sssh"));
    }

    #[test]
    fn test_overlay_apply() {
        let overlay = ConfigOverlay {
            entry_point_url: Some("https://shop.example/api".to_string()),
            auto_fetch: Some(false),
            cache_ttl_secs: Some(60),
            ..ConfigOverlay::default()
        };
        let config = overlay.apply();
        assert_eq!(config.entry_point_url, "https://shop.example/api");
        assert!(!config.auto_fetch);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        // untouched keys keep defaults
        assert_eq!(config.agent, DEFAULT_AGENT);
    }

    #[test]
    fn test_unknown_json_key_rejected() {
        let parsed: Result<ConfigOverlay, _> =
            serde_json::from_str(r#"{"entry_point_url": "x", "no_such_key": 1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_overlay_or_prefers_left() {
        let file = ConfigOverlay {
            agent: Some("from-file".to_string()),
            ..ConfigOverlay::default()
        };
        let env = ConfigOverlay {
            agent: Some("from-env".to_string()),
            shop_url: Some("https://checkout.example/".to_string()),
            ..ConfigOverlay::default()
        };
        let merged = file.or(env);
        assert_eq!(merged.agent.as_deref(), Some("from-file"));
        assert_eq!(merged.shop_url.as_deref(), Some("https://checkout.example/"));
    }
}
