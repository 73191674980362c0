use crate::error::{GateError, Result};
use crate::rate_limit::matcher::RuleMatcher;
use crate::rate_limit::types::RateLimitRuleConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables overriding file settings
/// (e.g. `RATEGATE__REDIS__URL`)
pub const ENV_PREFIX: &str = "RATEGATE";

/// Main gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Shared store configuration
    pub redis: RedisConfig,
    /// Rate limiting configuration
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Port for the Prometheus listener (disabled when unset)
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// How long a request waits for the store (in milliseconds)
    #[serde(default = "default_redis_timeout")]
    pub timeout_ms: u64,
    /// Wrap identities in a hash tag so one caller's keys share a cluster slot
    #[serde(default)]
    pub cluster_hash_tag: bool,
}

/// What to do with a request when the store cannot be reached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Forward the request unlimited
    FailOpen,
    /// Reject the request with 503
    FailClosed,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Store failure policy; deliberately has no default
    pub on_store_error: StoreFailurePolicy,
    /// Rate limit rules, in priority order for equal limits
    #[serde(default)]
    pub rules: Vec<RateLimitRuleConfig>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_redis_timeout() -> u64 {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            metrics_port: None,
        }
    }
}

impl GateConfig {
    /// Load configuration from a YAML file, with `RATEGATE__*` environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(GateError::Config(format!(
                "Failed to read config file: {} not found",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Yaml,
            ))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GateError::Config(format!("Failed to read config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| GateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.redis.url.is_empty() {
            return Err(GateError::Config("Redis URL cannot be empty".to_string()));
        }
        redis::Client::open(self.redis.url.as_str())
            .map_err(|e| GateError::Config(format!("Invalid Redis URL: {}", e)))?;

        if self.redis.timeout_ms == 0 {
            return Err(GateError::Config(
                "Redis timeout_ms must be > 0".to_string(),
            ));
        }

        if self.server.metrics_port == Some(self.server.port) {
            return Err(GateError::Config(
                "metrics_port must differ from the server port".to_string(),
            ));
        }

        self.rule_matcher().map(|_| ())
    }

    /// Compile the configured rules
    pub fn rule_matcher(&self) -> Result<RuleMatcher> {
        RuleMatcher::from_config(&self.rate_limiting.rules)
    }
}
