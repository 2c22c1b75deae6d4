use std::{env, fmt, net::SocketAddr, sync::Arc};

use prstats_core::{DurationUnit, TimestampPolicy, UnknownSetting, DEFAULT_NAMESPACE};
use thiserror::Error;
use url::Url;

use super::server_bind_address;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub webhook_secret: Arc<[u8]>,
    pub metrics_namespace: String,
    pub duration_unit: DurationUnit,
    pub timestamp_policy: TimestampPolicy,
    /// Remote collector receiving submissions; the in-process recorder is used when absent.
    pub collector_url: Option<Url>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let secret = env::var("WEBHOOK_SECRET_TOKEN").unwrap_or_default();
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        let metrics_namespace = optional_var("METRICS_NAMESPACE")
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let duration_unit = optional_var("DURATION_UNIT")
            .map(|value| value.parse::<DurationUnit>())
            .transpose()?
            .unwrap_or_default();
        let timestamp_policy = optional_var("TIMESTAMP_POLICY")
            .map(|value| value.parse::<TimestampPolicy>())
            .transpose()?
            .unwrap_or_default();
        let collector_url = optional_var("METRICS_COLLECTOR_URL")
            .map(|value| parse_collector_url(&value))
            .transpose()?;

        Ok(Self {
            bind_addr,
            environment,
            webhook_secret: Arc::from(secret.into_bytes().into_boxed_slice()),
            metrics_namespace,
            duration_unit,
            timestamp_policy,
            collector_url,
        })
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("environment", &self.environment)
            .field("webhook_secret", &"<redacted>")
            .field("metrics_namespace", &self.metrics_namespace)
            .field("duration_unit", &self.duration_unit)
            .field("timestamp_policy", &self.timestamp_policy)
            .field("collector_url", &self.collector_url)
            .finish()
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses the collector base URL, appending a trailing `/` so relative joins keep the path.
fn parse_collector_url(value: &str) -> Result<Url, ConfigError> {
    let normalized = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    };
    Url::parse(&normalized).map_err(ConfigError::CollectorUrl)
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_ENV must be one of 'development', 'production', or 'test' (got {0})")]
    InvalidEnvironment(String),
    #[error("invalid APP_BIND_ADDR value: {0}")]
    BindAddress(std::net::AddrParseError),
    #[error("WEBHOOK_SECRET_TOKEN must be set to a non-empty value")]
    MissingSecret,
    #[error("invalid setting: {0}")]
    InvalidSetting(#[from] UnknownSetting),
    #[error("invalid METRICS_COLLECTOR_URL value: {0}")]
    CollectorUrl(url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_support::ENV_GUARD, DEFAULT_BIND_ADDR};

    const VARS: [&str; 7] = [
        "APP_ENV",
        "APP_BIND_ADDR",
        "WEBHOOK_SECRET_TOKEN",
        "METRICS_NAMESPACE",
        "DURATION_UNIT",
        "TIMESTAMP_POLICY",
        "METRICS_COLLECTOR_URL",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("WEBHOOK_SECRET_TOKEN", "s3cret");

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(&*config.webhook_secret, b"s3cret");
        assert_eq!(config.metrics_namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.duration_unit, DurationUnit::Days);
        assert_eq!(config.timestamp_policy, TimestampPolicy::Lenient);
        assert!(config.collector_url.is_none());

        clear_env();
    }

    #[test]
    fn requires_webhook_secret() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("WEBHOOK_SECRET_TOKEN", "");

        let err = AppConfig::from_env().expect_err("empty secret should error");
        assert!(matches!(err, ConfigError::MissingSecret));

        clear_env();
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");
        env::set_var("WEBHOOK_SECRET_TOKEN", "s3cret");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn parses_production_settings() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("WEBHOOK_SECRET_TOKEN", "s3cret");
        env::set_var("METRICS_NAMESPACE", "PRStats");
        env::set_var("DURATION_UNIT", "hours");
        env::set_var("TIMESTAMP_POLICY", "strict");
        env::set_var("METRICS_COLLECTOR_URL", "https://collector.internal/v1");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.metrics_namespace, "PRStats");
        assert_eq!(config.duration_unit, DurationUnit::Hours);
        assert_eq!(config.timestamp_policy, TimestampPolicy::Strict);
        assert_eq!(
            config.collector_url.as_ref().map(Url::as_str),
            Some("https://collector.internal/v1/")
        );

        clear_env();
    }

    #[test]
    fn rejects_unknown_duration_unit() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("WEBHOOK_SECRET_TOKEN", "s3cret");
        env::set_var("DURATION_UNIT", "fortnights");

        let err = AppConfig::from_env().expect_err("unknown unit should error");
        assert!(
            matches!(err, ConfigError::InvalidSetting(ref setting) if setting.value == "fortnights")
        );

        clear_env();
    }

    #[test]
    fn debug_output_redacts_secret() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("WEBHOOK_SECRET_TOKEN", "do-not-print");

        let config = AppConfig::from_env().expect("config should load");
        assert!(!format!("{config:?}").contains("do-not-print"));

        clear_env();
    }
}
