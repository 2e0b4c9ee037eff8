//! Live service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::config::ObservabilityConfig;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP API bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default ring timeout in seconds.
pub const DEFAULT_RING_TIMEOUT_SECONDS: u64 = 60;

/// Default participant ceiling for group calls.
pub const DEFAULT_GROUP_MAX_PARTICIPANTS: u32 = 100;

/// Default deadline for a single cache operation in milliseconds.
pub const DEFAULT_CACHE_OP_TIMEOUT_MS: u64 = 2000;

/// Default sibling service endpoints (local development).
pub const DEFAULT_RELATION_SERVICE_URL: &str = "http://localhost:10011";
pub const DEFAULT_USER_SERVICE_URL: &str = "http://localhost:10012";
pub const DEFAULT_GROUP_SERVICE_URL: &str = "http://localhost:10013";
pub const DEFAULT_MESSAGE_SERVICE_URL: &str = "http://localhost:10014";
pub const DEFAULT_PUSH_SERVICE_URL: &str = "http://localhost:10015";

/// Live service configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Cache connection URL.
    /// Protected by `SecretString` since it may embed a password.
    pub redis_url: SecretString,

    /// HTTP API bind address (default: "0.0.0.0:8090").
    pub bind_address: String,

    /// How long an unanswered call rings before it is torn down.
    /// Also the TTL of freshly created rooms and presence pointers.
    pub ring_timeout: Duration,

    /// Participant ceiling for group calls.
    pub group_max_participants: u32,

    /// Deadline applied to every cache operation.
    pub cache_op_timeout: Duration,

    /// Signaling service server API base URL.
    pub signaling_url: String,

    /// Signaling endpoint handed to clients (defaults to `signaling_url`).
    pub signaling_public_url: String,

    /// Signaling API key (token issuer).
    pub signaling_api_key: String,

    /// Signaling API secret used to sign access tokens.
    pub signaling_api_secret: SecretString,

    /// Relation service base URL.
    pub relation_service_url: String,

    /// User service base URL.
    pub user_service_url: String,

    /// Group service base URL.
    pub group_service_url: String,

    /// Message service base URL.
    pub message_service_url: String,

    /// Push service base URL.
    pub push_service_url: String,

    /// Log level and format.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("ring_timeout", &self.ring_timeout)
            .field("group_max_participants", &self.group_max_participants)
            .field("cache_op_timeout", &self.cache_op_timeout)
            .field("signaling_url", &self.signaling_url)
            .field("signaling_public_url", &self.signaling_public_url)
            .field("signaling_api_key", &self.signaling_api_key)
            .field("signaling_api_secret", &"[REDACTED]")
            .field("relation_service_url", &self.relation_service_url)
            .field("user_service_url", &self.user_service_url)
            .field("group_service_url", &self.group_service_url)
            .field("message_service_url", &self.message_service_url)
            .field("push_service_url", &self.push_service_url)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional(vars: &HashMap<String, String>, name: &str, default: &str) -> String {
    vars.get(name)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn parsed<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(required(vars, "REDIS_URL")?);
        let signaling_url = required(vars, "SIGNALING_URL")?;
        let signaling_api_key = required(vars, "SIGNALING_API_KEY")?;
        let signaling_api_secret = SecretString::from(required(vars, "SIGNALING_API_SECRET")?);

        let signaling_public_url = optional(vars, "SIGNALING_PUBLIC_URL", &signaling_url);
        let bind_address = optional(vars, "LIVE_BIND_ADDRESS", DEFAULT_BIND_ADDRESS);

        let ring_timeout_seconds: u64 =
            parsed(vars, "LIVE_RING_TIMEOUT_SECONDS", DEFAULT_RING_TIMEOUT_SECONDS)?;
        if ring_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "LIVE_RING_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        let group_max_participants: u32 = parsed(
            vars,
            "LIVE_GROUP_MAX_PARTICIPANTS",
            DEFAULT_GROUP_MAX_PARTICIPANTS,
        )?;
        if group_max_participants < 2 {
            return Err(ConfigError::InvalidValue(
                "LIVE_GROUP_MAX_PARTICIPANTS must be at least 2".to_string(),
            ));
        }

        let cache_op_timeout_ms: u64 =
            parsed(vars, "LIVE_CACHE_OP_TIMEOUT_MS", DEFAULT_CACHE_OP_TIMEOUT_MS)?;

        Ok(Config {
            redis_url,
            bind_address,
            ring_timeout: Duration::from_secs(ring_timeout_seconds),
            group_max_participants,
            cache_op_timeout: Duration::from_millis(cache_op_timeout_ms),
            signaling_url,
            signaling_public_url,
            signaling_api_key,
            signaling_api_secret,
            relation_service_url: optional(
                vars,
                "RELATION_SERVICE_URL",
                DEFAULT_RELATION_SERVICE_URL,
            ),
            user_service_url: optional(vars, "USER_SERVICE_URL", DEFAULT_USER_SERVICE_URL),
            group_service_url: optional(vars, "GROUP_SERVICE_URL", DEFAULT_GROUP_SERVICE_URL),
            message_service_url: optional(
                vars,
                "MESSAGE_SERVICE_URL",
                DEFAULT_MESSAGE_SERVICE_URL,
            ),
            push_service_url: optional(vars, "PUSH_SERVICE_URL", DEFAULT_PUSH_SERVICE_URL),
            observability: ObservabilityConfig::from_vars("LIVE", vars),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "REDIS_URL".to_string(),
                "redis://:cachepass@localhost:6379".to_string(),
            ),
            (
                "SIGNALING_URL".to_string(),
                "http://signaling:7880".to_string(),
            ),
            ("SIGNALING_API_KEY".to_string(), "APIdevkey".to_string()),
            (
                "SIGNALING_API_SECRET".to_string(),
                "c2lnbmFsaW5nLXNlY3JldA".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(
            config.redis_url.expose_secret(),
            "redis://:cachepass@localhost:6379"
        );
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(
            config.ring_timeout,
            Duration::from_secs(DEFAULT_RING_TIMEOUT_SECONDS)
        );
        assert_eq!(config.group_max_participants, DEFAULT_GROUP_MAX_PARTICIPANTS);
        assert_eq!(
            config.cache_op_timeout,
            Duration::from_millis(DEFAULT_CACHE_OP_TIMEOUT_MS)
        );
        // Public URL falls back to the server API URL
        assert_eq!(config.signaling_public_url, "http://signaling:7880");
        assert_eq!(config.push_service_url, DEFAULT_PUSH_SERVICE_URL);
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("LIVE_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("LIVE_RING_TIMEOUT_SECONDS".to_string(), "45".to_string());
        vars.insert("LIVE_GROUP_MAX_PARTICIPANTS".to_string(), "16".to_string());
        vars.insert("LIVE_CACHE_OP_TIMEOUT_MS".to_string(), "500".to_string());
        vars.insert(
            "SIGNALING_PUBLIC_URL".to_string(),
            "wss://rtc.example.com".to_string(),
        );
        vars.insert("PUSH_SERVICE_URL".to_string(), "http://push:80".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.ring_timeout, Duration::from_secs(45));
        assert_eq!(config.group_max_participants, 16);
        assert_eq!(config.cache_op_timeout, Duration::from_millis(500));
        assert_eq!(config.signaling_public_url, "wss://rtc.example.com");
        assert_eq!(config.push_service_url, "http://push:80");
    }

    #[test]
    fn test_from_vars_missing_redis_url() {
        let mut vars = base_vars();
        vars.remove("REDIS_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "REDIS_URL"));
    }

    #[test]
    fn test_from_vars_missing_signaling_secret() {
        let mut vars = base_vars();
        vars.remove("SIGNALING_API_SECRET");

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SIGNALING_API_SECRET")
        );
    }

    #[test]
    fn test_from_vars_rejects_zero_ring_timeout() {
        let mut vars = base_vars();
        vars.insert("LIVE_RING_TIMEOUT_SECONDS".to_string(), "0".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_non_numeric_values() {
        let mut vars = base_vars();
        vars.insert(
            "LIVE_GROUP_MAX_PARTICIPANTS".to_string(),
            "lots".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("LIVE_GROUP_MAX_PARTICIPANTS"))
        );
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("cachepass"));
        assert!(!debug_output.contains("c2lnbmFsaW5nLXNlY3JldA"));
    }
}
