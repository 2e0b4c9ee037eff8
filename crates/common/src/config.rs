//! Common configuration types for Parley components.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

/// Default log directive when neither `RUST_LOG` nor a service override is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level directive (trace, debug, info, warn, error, or a full filter)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Read `{prefix}_LOG_LEVEL` and `{prefix}_LOG_JSON` from a variable map.
    #[must_use]
    pub fn from_vars(prefix: &str, vars: &HashMap<String, String>) -> Self {
        let log_level = vars
            .get(&format!("{prefix}_LOG_LEVEL"))
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = vars
            .get(&format!("{prefix}_LOG_JSON"))
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"));

        Self {
            log_level,
            json_logs,
        }
    }

    /// Build the tracing filter. `RUST_LOG` wins over the configured level.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}
