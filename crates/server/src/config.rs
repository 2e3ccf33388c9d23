//! Bridge configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPIFY_WEBHOOK_SECRET` - Shared secret for webhook HMAC verification
//!
//! At least one Cin7 back end must be configured:
//! - `CIN7_OMNI_BASE_URL` / `CIN7_OMNI_USERNAME` / `CIN7_OMNI_API_KEY` -
//!   Cin7 Omni v1 API (basic auth)
//! - `CIN7_CORE_BASE_URL` / `CIN7_CORE_ACCOUNT_ID` / `CIN7_CORE_APP_KEY` -
//!   Cin7 Core API (account-id/application-key headers)
//!
//! ## Optional
//! - `BRIDGE_HOST` - Bind address (default: 127.0.0.1)
//! - `BRIDGE_PORT` - Listen port (default: 8080)
//! - `SHOPIFY_SHOP_DOMAIN` - When set, webhooks must carry this shop domain
//! - `SHOPIFY_STORE_URL` / `SHOPIFY_ACCESS_TOKEN` - Shopify Admin API
//!   (enables the quote request endpoint)
//! - `SHOPIFY_API_VERSION` - Admin API version (default: 2024-01)
//! - `CIN7_OMNI_LOAD_BOMS` - Pass `loadboms=true` on sales orders (default: false)
//! - `CIN7_BRANCH_ID` - Omni branch for mapped documents
//! - `CIN7_CORE_LOCATION` - Core location name for mapped sales
//! - `CIN7_CORE_TAX_RULE` - Core tax rule name for mapped sales
//! - `BRIDGE_DEFAULT_CURRENCY` - Currency when the order carries none (default: AUD)
//! - `BRIDGE_FALLBACK_TAX_RATE` - Fractional rate when the order carries none (default: 0.1)
//! - `BRIDGE_DRY_RUN` - Log mapped payloads instead of sending (default: false)
//! - `BRIDGE_VERBOSE` - Default the log filter to debug (default: false)
//! - `BRIDGE_QUEUE_CAPACITY` - Dispatch queue depth before backpressure (default: 256)
//! - `CIN7_MAX_PER_SECOND` / `CIN7_MAX_PER_MINUTE` - Outbound rate limits (default: 3 / 60)
//! - `CIN7_MAX_ATTEMPTS` - Attempt budget per outbound request (default: 4)
//! - `CIN7_RETRY_BASE_MS` / `CIN7_RETRY_CAP_MS` / `CIN7_RETRY_JITTER_MS` -
//!   Backoff tuning (default: 500 / 10000 / 250)
//! - `CORS_ORIGINS` - Comma-separated origins for the quote API (default: *)
//! - `SENTRY_DSN` / `SENTRY_ENVIRONMENT` - Error tracking
//! - `BRIDGE_TLS_CERT` / `BRIDGE_TLS_KEY` - PEM-encoded certificate and key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use cin7_bridge_core::BranchId;
use cin7_bridge_core::mapping::MapperSettings;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("No Cin7 back end configured: set CIN7_OMNI_* and/or CIN7_CORE_*")]
    NoBackend,
}

/// Bridge application configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Inbound webhook verification
    pub webhook: WebhookConfig,
    /// Cin7 Omni API (optional - enables the Omni webhook routes)
    pub omni: Option<OmniConfig>,
    /// Cin7 Core API (optional - enables the Core webhook route)
    pub core: Option<CoreConfig>,
    /// Shopify Admin API (optional - enables the quote request endpoint)
    pub shopify_admin: Option<ShopifyAdminConfig>,
    /// Field mapper parameters
    pub mapper: MapperSettings,
    /// Outbound dispatch queue tuning
    pub dispatch: DispatchSettings,
    /// Log mapped payloads instead of sending them downstream
    pub dry_run: bool,
    /// Default the log filter to debug for this crate
    pub verbose: bool,
    /// Allowed CORS origins for the quote API ("*" = any)
    pub cors_origins: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "staging", "production")
    pub sentry_environment: Option<String>,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// Inbound webhook verification settings.
///
/// Implements `Debug` manually to redact the shared secret.
#[derive(Clone)]
pub struct WebhookConfig {
    /// Shared secret for the HMAC-SHA256 signature
    pub secret: SecretString,
    /// When set, the `X-Shopify-Shop-Domain` header must match exactly
    pub allowed_shop_domain: Option<String>,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &"[REDACTED]")
            .field("allowed_shop_domain", &self.allowed_shop_domain)
            .finish()
    }
}

/// Cin7 Omni API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct OmniConfig {
    /// API base URL, e.g. `https://api.cin7.com/api`
    pub base_url: String,
    /// Basic auth username
    pub username: String,
    /// Basic auth password (the Omni API key)
    pub api_key: SecretString,
    /// Pass `loadboms=true` when creating sales orders
    pub load_boms: bool,
}

impl std::fmt::Debug for OmniConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmniConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_key", &"[REDACTED]")
            .field("load_boms", &self.load_boms)
            .finish()
    }
}

/// Cin7 Core API configuration.
///
/// Implements `Debug` manually to redact the application key.
#[derive(Clone)]
pub struct CoreConfig {
    /// API base URL, e.g. `https://inventory.dearsystems.com/ExternalApi/v2`
    pub base_url: String,
    /// `api-auth-accountid` header value
    pub account_id: String,
    /// `api-auth-applicationkey` header value
    pub app_key: SecretString,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("app_key", &"[REDACTED]")
            .finish()
    }
}

/// Shopify Admin API configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct ShopifyAdminConfig {
    /// Store URL, e.g. `https://your-store.myshopify.com`
    pub store_url: String,
    /// Admin API access token
    pub access_token: SecretString,
    /// API version (e.g. 2024-01)
    pub api_version: String,
}

impl std::fmt::Debug for ShopifyAdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyAdminConfig")
            .field("store_url", &self.store_url)
            .field("access_token", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Outbound dispatch queue tuning.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Maximum requests in any trailing one-second window
    pub max_per_second: usize,
    /// Maximum requests in any trailing sixty-second window
    pub max_per_minute: usize,
    /// Attempt budget per request (first try included)
    pub max_attempts: u32,
    /// Backoff base; the delay grows linearly with the attempt number
    pub retry_base: Duration,
    /// Backoff ceiling
    pub retry_cap: Duration,
    /// Upper bound of the random jitter added to each backoff
    pub retry_jitter: Duration,
    /// Queue depth before enqueue reports backpressure
    pub queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_per_second: 3,
            max_per_minute: 60,
            max_attempts: 4,
            retry_base: Duration::from_millis(500),
            retry_cap: Duration::from_secs(10),
            retry_jitter: Duration::from_millis(250),
            queue_capacity: 256,
        }
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("BRIDGE_TLS_CERT");
        let key_pem = get_optional_env("BRIDGE_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "BRIDGE_TLS_*".to_string(),
                "Both BRIDGE_TLS_CERT and BRIDGE_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// if secrets fail validation (placeholder detection, entropy check), or
    /// if neither Cin7 back end is configured.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("BRIDGE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("BRIDGE_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("BRIDGE_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("BRIDGE_PORT".to_string(), e.to_string()))?;

        let webhook = WebhookConfig::from_env()?;
        let omni = OmniConfig::from_env()?;
        let core = CoreConfig::from_env()?;
        if omni.is_none() && core.is_none() {
            return Err(ConfigError::NoBackend);
        }

        let shopify_admin = ShopifyAdminConfig::from_env()?;
        let mapper = mapper_settings_from_env()?;
        let dispatch = DispatchSettings::from_env()?;

        let cors_origins = get_env_or_default("CORS_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            port,
            webhook,
            omni,
            core,
            shopify_admin,
            mapper,
            dispatch,
            dry_run: get_bool_env("BRIDGE_DRY_RUN"),
            verbose: get_bool_env("BRIDGE_VERBOSE"),
            cors_origins,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            tls: TlsConfig::from_env()?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl WebhookConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: get_validated_secret("SHOPIFY_WEBHOOK_SECRET")?,
            allowed_shop_domain: get_optional_env("SHOPIFY_SHOP_DOMAIN"),
        })
    }
}

impl OmniConfig {
    /// Load the Omni group from environment.
    ///
    /// Returns `None` when none of the variables are set; all three must be
    /// set together otherwise.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let base_url = get_optional_env("CIN7_OMNI_BASE_URL");
        let username = get_optional_env("CIN7_OMNI_USERNAME");
        let api_key = get_optional_env("CIN7_OMNI_API_KEY");

        match (base_url, username, api_key) {
            (Some(base_url), Some(username), Some(api_key)) => {
                validate_base_url("CIN7_OMNI_BASE_URL", &base_url)?;
                validate_secret_strength(&api_key, "CIN7_OMNI_API_KEY")?;
                Ok(Some(Self {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    username,
                    api_key: SecretString::from(api_key),
                    load_boms: get_bool_env("CIN7_OMNI_LOAD_BOMS"),
                }))
            }
            (None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "CIN7_OMNI_*".to_string(),
                "CIN7_OMNI_BASE_URL, CIN7_OMNI_USERNAME and CIN7_OMNI_API_KEY must be set together"
                    .to_string(),
            )),
        }
    }
}

impl CoreConfig {
    /// Load the Core group from environment.
    ///
    /// Returns `None` when none of the variables are set; all three must be
    /// set together otherwise.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let base_url = get_optional_env("CIN7_CORE_BASE_URL");
        let account_id = get_optional_env("CIN7_CORE_ACCOUNT_ID");
        let app_key = get_optional_env("CIN7_CORE_APP_KEY");

        match (base_url, account_id, app_key) {
            (Some(base_url), Some(account_id), Some(app_key)) => {
                validate_base_url("CIN7_CORE_BASE_URL", &base_url)?;
                validate_secret_strength(&app_key, "CIN7_CORE_APP_KEY")?;
                Ok(Some(Self {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    account_id,
                    app_key: SecretString::from(app_key),
                }))
            }
            (None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "CIN7_CORE_*".to_string(),
                "CIN7_CORE_BASE_URL, CIN7_CORE_ACCOUNT_ID and CIN7_CORE_APP_KEY must be set together"
                    .to_string(),
            )),
        }
    }
}

impl ShopifyAdminConfig {
    /// Load the Shopify Admin group from environment.
    ///
    /// Returns `None` when not set, which disables the quote request
    /// endpoint.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let store_url = get_optional_env("SHOPIFY_STORE_URL");
        let access_token = get_optional_env("SHOPIFY_ACCESS_TOKEN");

        match (store_url, access_token) {
            (Some(store_url), Some(access_token)) => {
                validate_base_url("SHOPIFY_STORE_URL", &store_url)?;
                validate_secret_strength(&access_token, "SHOPIFY_ACCESS_TOKEN")?;
                Ok(Some(Self {
                    store_url: store_url.trim_end_matches('/').to_string(),
                    access_token: SecretString::from(access_token),
                    api_version: get_env_or_default("SHOPIFY_API_VERSION", "2024-01"),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SHOPIFY_*".to_string(),
                "SHOPIFY_STORE_URL and SHOPIFY_ACCESS_TOKEN must be set together".to_string(),
            )),
        }
    }
}

impl DispatchSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_per_second: get_parsed_env("CIN7_MAX_PER_SECOND", defaults.max_per_second)?,
            max_per_minute: get_parsed_env("CIN7_MAX_PER_MINUTE", defaults.max_per_minute)?,
            max_attempts: get_parsed_env("CIN7_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_base: Duration::from_millis(get_parsed_env("CIN7_RETRY_BASE_MS", 500)?),
            retry_cap: Duration::from_millis(get_parsed_env("CIN7_RETRY_CAP_MS", 10_000)?),
            retry_jitter: Duration::from_millis(get_parsed_env("CIN7_RETRY_JITTER_MS", 250)?),
            queue_capacity: get_parsed_env("BRIDGE_QUEUE_CAPACITY", defaults.queue_capacity)?,
        })
    }
}

fn mapper_settings_from_env() -> Result<MapperSettings, ConfigError> {
    let defaults = MapperSettings::default();

    let fallback_tax_rate = match get_optional_env("BRIDGE_FALLBACK_TAX_RATE") {
        Some(raw) => raw.parse::<Decimal>().map_err(|e| {
            ConfigError::InvalidEnvVar("BRIDGE_FALLBACK_TAX_RATE".to_string(), e.to_string())
        })?,
        None => defaults.fallback_tax_rate,
    };
    if fallback_tax_rate < Decimal::ZERO || fallback_tax_rate >= Decimal::ONE {
        return Err(ConfigError::InvalidEnvVar(
            "BRIDGE_FALLBACK_TAX_RATE".to_string(),
            "must be a fractional rate in [0, 1), e.g. 0.1 for 10%".to_string(),
        ));
    }

    let branch_id = match get_optional_env("CIN7_BRANCH_ID") {
        Some(raw) => Some(BranchId::new(raw.parse::<i64>().map_err(|e| {
            ConfigError::InvalidEnvVar("CIN7_BRANCH_ID".to_string(), e.to_string())
        })?)),
        None => None,
    };

    Ok(MapperSettings {
        default_currency: get_env_or_default("BRIDGE_DEFAULT_CURRENCY", &defaults.default_currency),
        fallback_tax_rate,
        branch_id,
        location: get_optional_env("CIN7_CORE_LOCATION"),
        tax_rule: get_optional_env("CIN7_CORE_TAX_RULE"),
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a boolean toggle: "1", "true" and "yes" (any case) enable it.
fn get_bool_env(key: &str) -> bool {
    get_optional_env(key).is_some_and(|v| {
        let v = v.trim();
        v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
    })
}

/// Get an environment variable parsed to `T`, with a default when absent.
fn get_parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Validate that a base URL parses and uses http(s).
fn validate_base_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", parsed.scheme()),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the secret issued by the upstream service."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
