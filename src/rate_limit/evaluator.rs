use super::store::{WindowBatch, WindowSpec, WindowStore};
use super::types::{RateLimitKey, RateLimitResult, RateLimitRule, WindowTimestamp};
use crate::error::{GateError, Result};
use crate::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Runs one atomic check-and-record per request against the shared store
#[derive(Clone)]
pub struct SlidingWindowEvaluator {
    store: Arc<dyn WindowStore>,
    /// Wrap identities in a Redis Cluster hash tag
    hash_tag: bool,
}

impl SlidingWindowEvaluator {
    pub fn new(store: Arc<dyn WindowStore>, hash_tag: bool) -> Self {
        Self { store, hash_tag }
    }

    /// Check `identity` against `rules` and record the request if no rule
    /// is exhausted.
    ///
    /// Returns `None` when there are no rules; the store is not contacted.
    pub async fn evaluate(
        &self,
        identity: &str,
        rules: &[&RateLimitRule],
    ) -> Result<Option<RateLimitResult>> {
        self.evaluate_at(identity, rules, WindowTimestamp::now()).await
    }

    /// Same as [`evaluate`](Self::evaluate) with an explicit clock reading
    pub async fn evaluate_at(
        &self,
        identity: &str,
        rules: &[&RateLimitRule],
        now: WindowTimestamp,
    ) -> Result<Option<RateLimitResult>> {
        if rules.is_empty() {
            return Ok(None);
        }

        let batch = WindowBatch {
            now,
            member: format!("{}-{}", now.score(), Uuid::new_v4()),
            windows: rules
                .iter()
                .map(|rule| WindowSpec {
                    key: RateLimitKey::new(rule, identity).to_redis_key(self.hash_tag),
                    window_secs: rule.window_secs,
                    max_requests: rule.max_requests,
                })
                .collect(),
        };

        let started = Instant::now();
        let outcome = self.store.check_and_record(&batch).await;
        metrics::record_store_latency(started.elapsed().as_secs_f64(), outcome.is_ok());
        let outcome = outcome?;

        let rule = rules.get(outcome.binding).ok_or_else(|| {
            GateError::StoreUnavailable(format!("store reported unknown rule {}", outcome.binding))
        })?;
        if outcome.limited {
            warn!(
                identity = %identity,
                path_key = %rule.path_key,
                window_secs = rule.window_secs,
                limit = rule.max_requests,
                "Rate limit exceeded"
            );
            Ok(Some(RateLimitResult::denied(
                &rule.path_key,
                rule.max_requests,
                outcome.reset_after,
            )))
        } else {
            debug!(
                identity = %identity,
                path_key = %rule.path_key,
                remaining = outcome.remaining,
                "Rate limit check passed"
            );
            Ok(Some(RateLimitResult::allowed(
                &rule.path_key,
                outcome.remaining,
                rule.max_requests,
                outcome.reset_after,
            )))
        }
    }
}
