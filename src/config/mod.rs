//! Configuration management
//!
//! Configuration is loaded from a `config.yml` file and can be overridden
//! with `INKPOST_<SECTION>_<KEY>` environment variables.
//!
//! Missing optional values are filled with sensible defaults.

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub comments: CommentsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path or `sqlite:` URL. `:memory:` is accepted.
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/inkpost.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// Fallback TTL for entries stored without an explicit one
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_max_capacity() -> u64 {
    10_000
}

fn default_ttl() -> u64 {
    3600
}

/// Token and password policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token lifetime in days, 0 keeps tokens until logout
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: u32,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_days: default_token_ttl_days(),
            min_password_length: default_min_password_length(),
        }
    }
}

/// Longest accepted token lifetime (ten years)
pub const MAX_TOKEN_TTL_DAYS: u32 = 3650;

fn default_token_ttl_days() -> u32 {
    30
}

fn default_min_password_length() -> usize {
    8
}

/// Request and login throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Requests per hour for anonymous clients (keyed by IP)
    #[serde(default = "default_anon_per_hour")]
    pub anon_per_hour: u32,
    /// Requests per hour for authenticated users
    #[serde(default = "default_user_per_hour")]
    pub user_per_hour: u32,
    /// Failed logins allowed per email inside the login window
    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,
    #[serde(default = "default_login_window_minutes")]
    pub login_window_minutes: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            anon_per_hour: default_anon_per_hour(),
            user_per_hour: default_user_per_hour(),
            login_attempts: default_login_attempts(),
            login_window_minutes: default_login_window_minutes(),
        }
    }
}

fn default_anon_per_hour() -> u32 {
    100
}

fn default_user_per_hour() -> u32 {
    1000
}

fn default_login_attempts() -> u32 {
    5
}

fn default_login_window_minutes() -> u32 {
    15
}

/// Comment moderation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentsConfig {
    /// Publish new comments without waiting for a moderator
    #[serde(default)]
    pub auto_approve: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, `RUST_LOG` wins when set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "inkpost=info,tower_http=info".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with the
    /// line and column of the problem.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - INKPOST_SERVER_HOST, INKPOST_SERVER_PORT, INKPOST_SERVER_CORS_ORIGINS (comma separated)
    /// - INKPOST_DATABASE_URL, INKPOST_DATABASE_MAX_CONNECTIONS
    /// - INKPOST_CACHE_MAX_CAPACITY, INKPOST_CACHE_TTL_SECONDS
    /// - INKPOST_AUTH_TOKEN_TTL_DAYS, INKPOST_AUTH_MIN_PASSWORD_LENGTH
    /// - INKPOST_THROTTLE_ANON_PER_HOUR, INKPOST_THROTTLE_USER_PER_HOUR
    /// - INKPOST_THROTTLE_LOGIN_ATTEMPTS, INKPOST_THROTTLE_LOGIN_WINDOW_MINUTES
    /// - INKPOST_COMMENTS_AUTO_APPROVE
    /// - INKPOST_LOG_FILTER
    ///
    /// Values that fail to parse are ignored.
    pub fn load_with_env(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        override_string("INKPOST_SERVER_HOST", &mut self.server.host);
        override_parsed("INKPOST_SERVER_PORT", &mut self.server.port);
        if let Ok(origins) = std::env::var("INKPOST_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        override_string("INKPOST_DATABASE_URL", &mut self.database.url);
        override_parsed(
            "INKPOST_DATABASE_MAX_CONNECTIONS",
            &mut self.database.max_connections,
        );

        override_parsed("INKPOST_CACHE_MAX_CAPACITY", &mut self.cache.max_capacity);
        override_parsed("INKPOST_CACHE_TTL_SECONDS", &mut self.cache.ttl_seconds);

        override_parsed("INKPOST_AUTH_TOKEN_TTL_DAYS", &mut self.auth.token_ttl_days);
        override_parsed(
            "INKPOST_AUTH_MIN_PASSWORD_LENGTH",
            &mut self.auth.min_password_length,
        );

        override_parsed(
            "INKPOST_THROTTLE_ANON_PER_HOUR",
            &mut self.throttle.anon_per_hour,
        );
        override_parsed(
            "INKPOST_THROTTLE_USER_PER_HOUR",
            &mut self.throttle.user_per_hour,
        );
        override_parsed(
            "INKPOST_THROTTLE_LOGIN_ATTEMPTS",
            &mut self.throttle.login_attempts,
        );
        override_parsed(
            "INKPOST_THROTTLE_LOGIN_WINDOW_MINUTES",
            &mut self.throttle.login_window_minutes,
        );

        override_parsed(
            "INKPOST_COMMENTS_AUTO_APPROVE",
            &mut self.comments.auto_approve,
        );

        override_string("INKPOST_LOG_FILTER", &mut self.log.filter);
    }

    /// Check values that would otherwise fail later at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".into(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".into(),
            ));
        }
        if self.throttle.anon_per_hour == 0 || self.throttle.user_per_hour == 0 {
            return Err(ConfigError::ValidationError(
                "throttle rates must be greater than 0".into(),
            ));
        }
        if self.auth.token_ttl_days > MAX_TOKEN_TTL_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "auth.token_ttl_days must be at most {}",
                MAX_TOKEN_TTL_DAYS
            )));
        }
        for origin in &self.server.cors_origins {
            if origin.parse::<HeaderValue>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "invalid CORS origin '{}'",
                    origin
                )));
            }
        }
        Ok(())
    }
}

fn override_string(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        *target = value;
    }
}

fn override_parsed<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.trim().parse::<T>() {
            *target = parsed;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test module that touches environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "INKPOST_SERVER_HOST",
    "INKPOST_SERVER_PORT",
    "INKPOST_SERVER_CORS_ORIGINS",
    "INKPOST_DATABASE_URL",
    "INKPOST_DATABASE_MAX_CONNECTIONS",
    "INKPOST_CACHE_MAX_CAPACITY",
    "INKPOST_CACHE_TTL_SECONDS",
    "INKPOST_AUTH_TOKEN_TTL_DAYS",
    "INKPOST_AUTH_MIN_PASSWORD_LENGTH",
    "INKPOST_THROTTLE_ANON_PER_HOUR",
    "INKPOST_THROTTLE_USER_PER_HOUR",
    "INKPOST_THROTTLE_LOGIN_ATTEMPTS",
    "INKPOST_THROTTLE_LOGIN_WINDOW_MINUTES",
    "INKPOST_COMMENTS_AUTO_APPROVE",
    "INKPOST_LOG_FILTER",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z][a-z0-9.]{0,20}",
            1u16..=65535,
            "[a-z]{1,10}/[a-z]{1,10}\\.db",
            1u64..100_000,
            1u32..10_000,
            1u32..10_000,
            any::<bool>(),
        )
            .prop_map(|(host, port, url, ttl, anon, user, auto_approve)| {
                let mut config = Config::default();
                config.server.host = host;
                config.server.port = port;
                config.database.url = url;
                config.cache.ttl_seconds = ttl;
                config.throttle.anon_per_hour = anon;
                config.throttle.user_per_hour = user;
                config.comments.auto_approve = auto_approve;
                config
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serialising a config to YAML and loading it back keeps every field.
        #[test]
        fn config_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("serialize config");
            let mut file = NamedTempFile::new().expect("temp file");
            write!(file, "{}", yaml).expect("write config");

            let parsed = Config::load(file.path()).expect("parse config");
            prop_assert_eq!(&config.server.host, &parsed.server.host);
            prop_assert_eq!(&config.server.port, &parsed.server.port);
            prop_assert_eq!(&config.database.url, &parsed.database.url);
            prop_assert_eq!(&config.cache.ttl_seconds, &parsed.cache.ttl_seconds);
            prop_assert_eq!(&config.throttle.anon_per_hour, &parsed.throttle.anon_per_hour);
            prop_assert_eq!(&config.throttle.user_per_hour, &parsed.throttle.user_per_hour);
            prop_assert_eq!(&config.comments.auto_approve, &parsed.comments.auto_approve);
            prop_assert!(parsed.validate().is_ok());
        }

        /// Environment values take precedence over file values.
        #[test]
        fn env_precedence_over_file(file_port in 1u16..30000, env_port in 30000u16..60000) {
            let _guard = lock_env();
            clear_env();

            let mut file = NamedTempFile::new().expect("temp file");
            write!(file, "server:\n  port: {}\n", file_port).expect("write config");
            std::env::set_var("INKPOST_SERVER_PORT", env_port.to_string());

            let config = Config::load_with_env(file.path()).expect("load config");
            clear_env();
            prop_assert_eq!(config.server.port, env_port);
        }
    }
}
