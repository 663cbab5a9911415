use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::services::pricing::PricingPolicy;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STORE_BACKEND: &str = "memory";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_REDIS_NAMESPACE: &str = "storefront";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com";
const DEFAULT_NIMBUS_BASE_URL: &str = "https://api.nimbuspost.com";

/// Which record store backend to run against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackendKind {
    Memory,
    File,
    Redis,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Record store backend: "memory", "file" or "redis"
    #[serde(default = "default_store_backend")]
    #[validate(custom = "validate_store_backend")]
    pub store_backend: String,

    /// Directory for the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Redis connection URL for the redis backend
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Key namespace inside Redis
    #[serde(default = "default_redis_namespace")]
    pub redis_namespace: String,

    /// Upper bound for a single store call (milliseconds)
    #[serde(default = "default_store_timeout_ms")]
    #[validate(range(min = 1))]
    pub store_timeout_ms: u64,

    /// Upper bound for a payment gateway or shipping provider call (seconds)
    #[serde(default = "default_upstream_timeout_secs")]
    #[validate(range(min = 1))]
    pub upstream_timeout_secs: u64,

    /// Whole-request timeout applied by the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// Tax rate applied to the subtotal (0.18 = 18%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_rate")]
    pub tax_rate: f64,

    /// Flat shipping fee per order
    #[serde(default = "default_shipping_fee")]
    #[validate(custom = "validate_non_negative")]
    pub shipping_fee: f64,

    /// Accepted difference between the declared and the computed total
    #[serde(default = "default_amount_tolerance")]
    #[validate(custom = "validate_non_negative")]
    pub amount_tolerance: f64,

    /// Razorpay public key id
    #[serde(default)]
    pub razorpay_key_id: Option<String>,

    /// Razorpay key secret; also signs checkout callbacks
    #[serde(default)]
    pub razorpay_key_secret: Option<String>,

    #[serde(default = "default_razorpay_base_url")]
    pub razorpay_base_url: String,

    /// NimbusPost bearer token
    #[serde(default)]
    pub nimbus_api_key: Option<String>,

    /// NimbusPost Client-ID header value
    #[serde(default)]
    pub nimbus_client_id: Option<String>,

    #[serde(default = "default_nimbus_base_url")]
    pub nimbus_base_url: String,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            store_backend: default_store_backend(),
            data_dir: default_data_dir(),
            redis_url: None,
            redis_namespace: default_redis_namespace(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            tax_rate: default_tax_rate(),
            shipping_fee: default_shipping_fee(),
            amount_tolerance: default_amount_tolerance(),
            razorpay_key_id: None,
            razorpay_key_secret: None,
            razorpay_base_url: default_razorpay_base_url(),
            nimbus_api_key: None,
            nimbus_client_id: None,
            nimbus_base_url: default_nimbus_base_url(),
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Checks if running in production
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        non_empty(&self.cors_allowed_origins).is_some()
    }

    /// Permissive CORS is allowed in development, or when explicitly requested
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn store_backend_kind(&self) -> Result<StoreBackendKind, AppConfigError> {
        match self.store_backend.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StoreBackendKind::Memory),
            "file" => Ok(StoreBackendKind::File),
            "redis" => Ok(StoreBackendKind::Redis),
            other => Err(AppConfigError::Invalid(format!(
                "unknown store backend: {other}"
            ))),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Pricing parameters as exact decimals.
    pub fn pricing_policy(&self) -> Result<PricingPolicy, AppConfigError> {
        let exact = |name: &str, value: f64| {
            Decimal::from_str(&value.to_string())
                .map_err(|e| AppConfigError::Invalid(format!("{name}: {e}")))
        };
        Ok(PricingPolicy {
            tax_rate: exact("tax_rate", self.tax_rate)?,
            shipping_fee: exact("shipping_fee", self.shipping_fee)?,
            tolerance: exact("amount_tolerance", self.amount_tolerance)?,
        })
    }

    /// Key id and secret, when both are configured.
    pub fn razorpay_credentials(&self) -> Option<(&str, &str)> {
        Some((
            non_empty(&self.razorpay_key_id)?,
            non_empty(&self.razorpay_key_secret)?,
        ))
    }

    /// Secret used to verify checkout callbacks.
    pub fn payment_signing_secret(&self) -> Option<&str> {
        non_empty(&self.razorpay_key_secret)
    }

    pub fn nimbus_credentials(&self) -> Option<(&str, &str)> {
        Some((
            non_empty(&self.nimbus_api_key)?,
            non_empty(&self.nimbus_client_id)?,
        ))
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.store_backend.eq_ignore_ascii_case("redis") && non_empty(&self.redis_url).is_none()
        {
            let mut err = ValidationError::new("redis_url_required");
            err.message = Some("APP__REDIS_URL is required when store_backend = redis".into());
            errors.add("redis_url", err);
        }

        if non_empty(&self.razorpay_key_id).is_some()
            && non_empty(&self.razorpay_key_secret).is_none()
        {
            let mut err = ValidationError::new("razorpay_key_secret_required");
            err.message =
                Some("APP__RAZORPAY_KEY_SECRET is required when a Razorpay key id is set".into());
            errors.add("razorpay_key_secret", err);
        }

        if self.is_production() && self.razorpay_credentials().is_none() {
            let mut err = ValidationError::new("razorpay_credentials_required");
            err.message =
                Some("Razorpay credentials must be configured in production".into());
            errors.add("razorpay_key_id", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_store_backend() -> String {
    DEFAULT_STORE_BACKEND.to_string()
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

fn default_redis_namespace() -> String {
    DEFAULT_REDIS_NAMESPACE.to_string()
}

fn default_store_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT_MS
}

fn default_upstream_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_tax_rate() -> f64 {
    0.18
}

fn default_shipping_fee() -> f64 {
    50.0
}

fn default_amount_tolerance() -> f64 {
    0.01
}

fn default_razorpay_base_url() -> String {
    DEFAULT_RAZORPAY_BASE_URL.to_string()
}

fn default_nimbus_base_url() -> String {
    DEFAULT_NIMBUS_BASE_URL.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_store_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "memory" | "in-memory" | "file" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("store_backend");
            err.message = Some("Must be one of: memory, file, redis".into());
            Err(err)
        }
    }
}

fn validate_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_non_negative(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must be a finite, non-negative amount".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same layering as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.store_backend_kind()?;
    app_config.pricing_policy()?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}


#[cfg(test)]
mod loading_tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn files_layer_over_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "host = \"127.0.0.1\"\nport = 9000\nstore_backend = \"file\"\ndata_dir = \"/tmp/orders\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("staging.toml"), "port = 9100\nshipping_fee = 40.0\ncors_allow_any_origin = true\n").unwrap();

        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.environment, "staging");
        assert_eq!(cfg.store_backend_kind().unwrap(), StoreBackendKind::File);
        assert_eq!(cfg.shipping_fee, 40.0);
        assert_eq!(cfg.tax_rate, 0.18);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("default.toml"), "jwt_secret = \"x\"\n").unwrap();
        assert!(matches!(
            load_config_from(dir.path(), "development"),
            Err(AppConfigError::Load(_))
        ));
    }
}
