//! Configuration loaded from `PAIRGATE_*` environment variables.
//!
//! `.env` files are loaded by the binary before [`Config::from_env`] runs.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::ConfigError;
use crate::gateway::{AddressFormat, RetryPolicy};
use crate::remote::BridgeConfig;
use crate::session::LifecycleConfig;

const DEFAULT_BIND: &str = "0.0.0.0:6789";
const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8090";
const DEFAULT_DEVICE_NAME: &str = "Pairgate";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected 'pretty' or 'json'")),
        }
    }
}

/// Service configuration.
#[derive(Debug)]
pub struct Config {
    pub bind: SocketAddr,
    /// JSON device store file.
    pub store_path: PathBuf,
    pub bridge: BridgeConfig,
    pub address: AddressFormat,
    pub lifecycle: LifecycleConfig,
    pub retry: RetryPolicy,
    /// Bearer token for the API. Unauthenticated when unset.
    pub api_token: Option<SecretString>,
    pub log_format: LogFormat,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the raw value of a
    /// variable or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind: SocketAddr = parse_or(&var, "PAIRGATE_BIND", || {
            DEFAULT_BIND
                .parse::<SocketAddr>()
                .map_err(|e| e.to_string())
        })?;

        let store_path = match var("PAIRGATE_STORE_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_store_path(),
        };

        let base_url: Url = parse_or(&var, "PAIRGATE_BRIDGE_URL", || {
            Url::parse(DEFAULT_BRIDGE_URL).map_err(|e| e.to_string())
        })?;
        let bridge = BridgeConfig {
            base_url,
            device_name: var("PAIRGATE_DEVICE_NAME").unwrap_or_else(|| DEFAULT_DEVICE_NAME.into()),
            request_timeout: secs(&var, "PAIRGATE_BRIDGE_TIMEOUT_SECS", 30)?,
        };

        let defaults = AddressFormat::default();
        let address = AddressFormat::new(
            var("PAIRGATE_COUNTRY_CODE").unwrap_or(defaults.country_code),
            var("PAIRGATE_ADDRESS_SUFFIX").unwrap_or(defaults.suffix),
        );
        if !address.country_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("PAIRGATE_COUNTRY_CODE", "must contain only digits"));
        }
        // A leading zero would be rewritten again on the next normalization.
        if address.country_code.is_empty() || address.country_code.starts_with('0') {
            return Err(invalid("PAIRGATE_COUNTRY_CODE", "must not start with 0"));
        }

        let lifecycle = LifecycleConfig {
            pairing_timeout: secs(&var, "PAIRGATE_PAIRING_TIMEOUT_SECS", 90)?,
            disconnect_settle: millis(&var, "PAIRGATE_DISCONNECT_SETTLE_MS", 2_000)?,
            reset_settle: millis(&var, "PAIRGATE_RESET_SETTLE_MS", 1_000)?,
        };

        let max_attempts: u32 = parse_or(&var, "PAIRGATE_SEND_ATTEMPTS", || Ok(3))?;
        if max_attempts == 0 {
            return Err(invalid("PAIRGATE_SEND_ATTEMPTS", "must be at least 1"));
        }
        let retry = RetryPolicy {
            max_attempts,
            step: millis(&var, "PAIRGATE_SEND_BACKOFF_MS", 1_000)?,
        };

        let api_token = var("PAIRGATE_API_TOKEN").map(SecretString::from);
        let log_format = parse_or(&var, "PAIRGATE_LOG_FORMAT", || Ok(LogFormat::default()))?;

        Ok(Self {
            bind,
            store_path,
            bridge,
            address,
            lifecycle,
            retry,
            api_token,
            log_format,
        })
    }
}

/// `~/.pairgate/device.json`, or `./.pairgate/device.json` without a home.
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pairgate")
        .join("device.json")
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: impl FnOnce() -> Result<T, String>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, e.to_string())),
        None => default().map_err(|e| invalid(key, e)),
    }
}

fn secs(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse_or(var, key, || Ok(default)).map(Duration::from_secs)
}

fn millis(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse_or(var, key, || Ok(default)).map(Duration::from_millis)
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}
