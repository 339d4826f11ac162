//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Rate Limiting
//!
//! - `THROTTLE_TTL_MS`: Window of the short tier in milliseconds (default: 60000)
//! - `THROTTLE_LIMIT`: Requests allowed in the short tier window (default: 100, 0 = global tiers off)
//! - `THROTTLE_SWEEP_INTERVAL_SECS`: Eviction interval for expired counters (default: 60)
//!
//! The medium and long tiers are derived from the base values, see
//! [`crate::throttle::default_tiers`].
//!
//! # Client Address Resolution
//!
//! - `TRUST_PROXY`: Honour `X-Forwarded-For` / `X-Real-IP` (default: false)
//! - `TRUSTED_PROXIES`: Optional CIDR list restricting which peers may set those headers

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::middleware::ip::CidrRange;

/// Error raised while loading configuration at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            name,
            reason: reason.to_string(),
        }
    }
}

/// Deployment environment.
///
/// Development mode exposes stack information in error envelopes and
/// lowers the default log level to `debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!(
                "unknown environment '{other}' (expected development, test or production)"
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

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
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Deployment environment (default: development)
    pub environment: Environment,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Window of the short tier (default: 60 seconds)
    pub throttle_ttl: Duration,

    /// Requests allowed per short-tier window (default: 100)
    /// Set to 0 to disable the global tiers
    pub throttle_limit: u32,

    /// Interval between sweeps of expired rate limit records (default: 60 seconds)
    pub throttle_sweep_interval: Duration,

    // =========================================================================
    // Client Address Configuration
    // =========================================================================
    /// Whether proxy headers may supply the client address (default: false)
    pub trust_proxy: bool,

    /// Networks allowed to supply proxy headers. Empty means any peer when
    /// `trust_proxy` is set.
    pub trusted_proxies: Vec<CidrRange>,

    // =========================================================================
    // Request Limits
    // =========================================================================
    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    /// Allowed CORS origins; "*" allows any origin
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log filter directive; falls back to the environment's default level
    pub log_level: String,

    /// Log output format (default: pretty)
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any value cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment: Environment = Self::parse_env("APP_ENV", Environment::default())?;

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            environment,

            throttle_ttl: Duration::from_millis(Self::parse_env("THROTTLE_TTL_MS", 60_000)?),
            throttle_limit: Self::parse_env("THROTTLE_LIMIT", 100)?,
            throttle_sweep_interval: Duration::from_secs(Self::parse_env(
                "THROTTLE_SWEEP_INTERVAL_SECS",
                60,
            )?),

            trust_proxy: Self::parse_env("TRUST_PROXY", false)?,
            trusted_proxies: Self::parse_trusted_proxies()?,

            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| Self::default_log_level(environment).to_string()),
            log_format: Self::parse_env("LOG_FORMAT", LogFormat::default())?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.throttle_ttl.is_zero() {
            return Err(ConfigError::invalid(
                "THROTTLE_TTL_MS",
                "must be greater than 0",
            ));
        }

        if self.throttle_sweep_interval.is_zero() {
            return Err(ConfigError::invalid(
                "THROTTLE_SWEEP_INTERVAL_SECS",
                "must be greater than 0",
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(ConfigError::invalid(
                "MAX_REQUEST_BODY_SIZE",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether envelopes may carry stack information.
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Check if the global rate limiting tiers are enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.throttle_limit > 0
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_enabled()
            .then(|| std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    fn default_log_level(environment: Environment) -> &'static str {
        match environment {
            Environment::Development => "debug",
            Environment::Test | Environment::Production => "info",
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) if !val.trim().is_empty() => val
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(name, e)),
            _ => Ok(default),
        }
    }

    fn parse_list(name: &str, default: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_else(|_| default.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parse trusted proxy CIDR ranges.
    ///
    /// Unlike origins, a malformed entry aborts startup: silently dropping a
    /// proxy range would change which clients share a rate limit bucket.
    fn parse_trusted_proxies() -> Result<Vec<CidrRange>, ConfigError> {
        Self::parse_list("TRUSTED_PROXIES", "")
            .iter()
            .map(|cidr| cidr.parse().map_err(|e| ConfigError::invalid("TRUSTED_PROXIES", e)))
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: Environment::Development,
            throttle_ttl: Duration::from_secs(60),
            throttle_limit: 100,
            throttle_sweep_interval: Duration::from_secs(60),
            trust_proxy: false,
            trusted_proxies: vec![],
            max_request_body_size: 1024 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.port, 3000);
        assert_eq!(config.throttle_limit, 100);
        assert_eq!(config.throttle_ttl, Duration::from_secs(60));
        assert!(!config.trust_proxy);
        assert!(config.is_development());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_rate_limiting_enabled() {
        assert!(Config::default().rate_limiting_enabled());

        let config = Config {
            throttle_limit: 0,
            ..Config::default()
        };
        assert!(!config.rate_limiting_enabled());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("DEV".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!("test".parse::<Environment>(), Ok(Environment::Test));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_validate_zero_ttl() {
        let config = Config {
            throttle_ttl: Duration::ZERO,
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("THROTTLE_TTL_MS"));
    }

    #[test]
    fn test_validate_zero_body_size() {
        let config = Config {
            max_request_body_size: 0,
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("MAX_REQUEST_BODY_SIZE"));
    }

    #[test]
    fn test_metrics_addr_disabled() {
        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert!(config.metrics_addr().is_none());
        assert!(Config::default().metrics_addr().is_some());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }
}
