// Process-level settings shared by the API and the worker

use std::env;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9100";
pub const DEFAULT_RESULT_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub redis_url: String,
    pub api_addr: String,
    pub metrics_addr: String,
    pub result_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            api_addr: DEFAULT_API_ADDR.to_string(),
            metrics_addr: DEFAULT_METRICS_ADDR.to_string(),
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults for
    /// anything unset or unparseable
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            api_addr: lookup("API_ADDR").unwrap_or(defaults.api_addr),
            metrics_addr: lookup("WORKER_METRICS_ADDR").unwrap_or(defaults.metrics_addr),
            result_ttl_secs: lookup("RESULT_TTL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.result_ttl_secs),
        }
    }
}
