use crate::error::{GateError, Result};
use matchit::Router as MatchitRouter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// How a rule's `path_pattern` is matched against request paths
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Path equals the pattern or continues it with a `/` segment
    #[default]
    Prefix,
    /// Path equals the pattern
    Exact,
    /// Pattern is a regular expression searched in the path
    Regex,
    /// Express-style route template (`/users/:id`, `/files/*path`)
    Route,
}

/// Rate limit rule as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRuleConfig {
    /// Pattern matched against the request path
    pub path_pattern: String,
    /// How `path_pattern` is interpreted
    #[serde(default)]
    pub match_type: MatchType,
    /// Counter namespace; rules sharing it share one counter per window
    pub path_key: String,
    /// Rolling window length (in seconds)
    pub window_secs: u64,
    /// Maximum requests admitted per window
    pub max_requests: u32,
}

/// Compiled path matcher
#[derive(Debug, Clone)]
pub enum PathPattern {
    Prefix(String),
    Exact(String),
    Regex(Regex),
    Route {
        template: String,
        matcher: MatchitRouter<()>,
    },
}

impl PathPattern {
    /// Compile a pattern for the given match type
    pub fn compile(pattern: &str, match_type: MatchType) -> Result<Self> {
        match match_type {
            MatchType::Prefix => Ok(PathPattern::Prefix(pattern.to_string())),
            MatchType::Exact => Ok(PathPattern::Exact(pattern.to_string())),
            MatchType::Regex => Regex::new(pattern).map(PathPattern::Regex).map_err(|e| {
                GateError::Config(format!("Invalid regex path pattern '{}': {}", pattern, e))
            }),
            MatchType::Route => {
                let mut matcher = MatchitRouter::new();
                matcher
                    .insert(convert_path_syntax(pattern), ())
                    .map_err(|e| {
                        GateError::Config(format!(
                            "Invalid route path pattern '{}': {}",
                            pattern, e
                        ))
                    })?;
                Ok(PathPattern::Route {
                    template: pattern.to_string(),
                    matcher,
                })
            }
        }
    }

    /// Check whether a request path matches
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Prefix(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
                None => false,
            },
            PathPattern::Exact(exact) => path == exact,
            PathPattern::Regex(regex) => regex.is_match(path),
            PathPattern::Route { matcher, .. } => matcher.at(path).is_ok(),
        }
    }

    /// The pattern as configured
    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Prefix(p) | PathPattern::Exact(p) => p.as_str(),
            PathPattern::Regex(regex) => regex.as_str(),
            PathPattern::Route { template, .. } => template.as_str(),
        }
    }
}

/// Convert path syntax from Express-style (:param, *path) to matchit syntax ({param}, {*path})
fn convert_path_syntax(path: &str) -> String {
    let mut result = String::with_capacity(path.len() + 4);
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' | '*' => {
                result.push_str(if ch == '*' { "{*" } else { "{" });
                while let Some(next_ch) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
                    result.push(next_ch);
                }
                result.push('}');
            }
            _ => result.push(ch),
        }
    }

    result
}

/// A validated rate limit rule
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub pattern: PathPattern,
    pub path_key: String,
    pub window_secs: u64,
    pub max_requests: u32,
}

impl RateLimitRule {
    /// Validate and compile a configured rule
    pub fn from_config(config: &RateLimitRuleConfig) -> Result<Self> {
        if config.path_pattern.is_empty() {
            return Err(GateError::Config(
                "Rate limit path_pattern cannot be empty".to_string(),
            ));
        }
        if config.path_key.is_empty() {
            return Err(GateError::Config(format!(
                "Rate limit path_key cannot be empty for pattern: {}",
                config.path_pattern
            )));
        }
        if config.window_secs == 0 {
            return Err(GateError::Config(format!(
                "Rate limit window must be > 0 for pattern: {}",
                config.path_pattern
            )));
        }

        Ok(Self {
            pattern: PathPattern::compile(&config.path_pattern, config.match_type)?,
            path_key: config.path_key.clone(),
            window_secs: config.window_secs,
            max_requests: config.max_requests,
        })
    }

    /// Shorthand for a prefix rule
    pub fn prefix(pattern: &str, path_key: &str, window_secs: u64, max_requests: u32) -> Self {
        Self {
            pattern: PathPattern::Prefix(pattern.to_string()),
            path_key: path_key.to_string(),
            window_secs,
            max_requests,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }
}

/// Store key for one caller's window under one rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub path_key: String,
    pub identity: String,
    pub window_secs: u64,
}

impl RateLimitKey {
    pub fn new(rule: &RateLimitRule, identity: &str) -> Self {
        Self {
            path_key: rule.path_key.clone(),
            identity: identity.to_string(),
            window_secs: rule.window_secs,
        }
    }

    /// Convert to a Redis key.
    ///
    /// With `hash_tag` the identity is wrapped in `{}` so every key of one
    /// caller lands in the same Redis Cluster slot.
    pub fn to_redis_key(&self, hash_tag: bool) -> String {
        if hash_tag {
            format!("{}:{{{}}}:{}", self.path_key, self.identity, self.window_secs)
        } else {
            format!("{}:{}:{}", self.path_key, self.identity, self.window_secs)
        }
    }
}

/// Request timestamp used as the sorted-set score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WindowTimestamp {
    pub secs: u64,
    pub micros: u32,
}

impl WindowTimestamp {
    pub const MICROS_PER_SEC: i64 = 1_000_000;

    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: elapsed.as_secs(),
            micros: elapsed.subsec_micros(),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self { secs, micros: 0 }
    }

    /// Microseconds since the epoch
    pub fn score(&self) -> i64 {
        self.secs as i64 * Self::MICROS_PER_SEC + self.micros as i64
    }

    pub fn plus(&self, duration: Duration) -> Self {
        let total = self.score() as u128 + duration.as_micros();
        Self {
            secs: (total / Self::MICROS_PER_SEC as u128) as u64,
            micros: (total % Self::MICROS_PER_SEC as u128) as u32,
        }
    }
}

/// Rate limit result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Counter namespace of the binding rule
    pub path_key: String,
    /// Remaining requests in the current window
    pub remaining: u64,
    /// Total limit
    pub limit: u32,
    /// When the limit resets (seconds from now)
    pub reset_after: u64,
    /// Retry after duration (for 429 responses)
    pub retry_after: Option<u64>,
}

impl RateLimitResult {
    /// Create an allowed result
    pub fn allowed(path_key: &str, remaining: u64, limit: u32, reset_after: u64) -> Self {
        Self {
            allowed: true,
            path_key: path_key.to_string(),
            remaining,
            limit,
            reset_after,
            retry_after: None,
        }
    }

    /// Create a denied result
    pub fn denied(path_key: &str, limit: u32, retry_after: u64) -> Self {
        Self {
            allowed: false,
            path_key: path_key.to_string(),
            remaining: 0,
            limit,
            reset_after: retry_after,
            retry_after: Some(retry_after),
        }
    }
}
