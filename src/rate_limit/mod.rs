//! Sliding-window rate limiting
//!
//! Requests are attributed to a caller identity, matched against the
//! configured rules, and checked against every applicable rule in one
//! atomic store transaction:
//!
//! - **Rule matching**: strictest rule per `(path_key, window_secs)` wins
//! - **Sliding window**: one sorted set per caller, rule and window
//! - **All-or-nothing**: a request is recorded against every rule or none
//! - **Shared store**: Redis Lua script, or an in-process store for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use rategate::config::StoreFailurePolicy;
//! use rategate::rate_limit::{
//!     AdmissionGate, MemoryWindowStore, RateLimitRule, RuleMatcher, SlidingWindowEvaluator,
//! };
//! use std::sync::Arc;
//!
//! let matcher = RuleMatcher::new(vec![RateLimitRule::prefix("/api", "api", 60, 100)]);
//! let evaluator = SlidingWindowEvaluator::new(Arc::new(MemoryWindowStore::new()), false);
//! let gate = AdmissionGate::new(matcher, evaluator, StoreFailurePolicy::FailClosed);
//! ```

pub mod evaluator;
pub mod gate;
pub mod local;
pub mod lua_scripts;
pub mod matcher;
pub mod middleware;
pub mod redis;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use evaluator::SlidingWindowEvaluator;
pub use gate::{Admission, AdmissionGate};
pub use local::MemoryWindowStore;
pub use matcher::RuleMatcher;
pub use middleware::{add_rate_limit_headers, admission_middleware, create_rate_limit_response};
pub use redis::RedisWindowStore;
pub use store::{WindowBatch, WindowOutcome, WindowSpec, WindowStore};
pub use types::{
    MatchType, PathPattern, RateLimitKey, RateLimitResult, RateLimitRule, RateLimitRuleConfig,
    WindowTimestamp,
};
