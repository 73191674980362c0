use super::evaluator::SlidingWindowEvaluator;
use super::matcher::RuleMatcher;
use super::middleware::{add_rate_limit_headers, create_rate_limit_response};
use super::types::RateLimitResult;
use crate::config::StoreFailurePolicy;
use crate::error::{GateError, Result};
use crate::identity::{extract_identity, IdentityError};
use crate::metrics;
use axum::{
    http::{HeaderMap, Request},
    response::{IntoResponse, Response},
};
use std::future::Future;
use tracing::{debug, error, warn};

/// Terminal outcome of admission control for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Forward the request; carries the binding rule's status when any rule applied
    Admitted(Option<RateLimitResult>),
    /// Reject with 429
    Limited(RateLimitResult),
    /// Reject with 401
    Unauthenticated(IdentityError),
}

/// Admission gate: identity, rule matching and window evaluation
pub struct AdmissionGate {
    matcher: RuleMatcher,
    evaluator: SlidingWindowEvaluator,
    on_store_error: StoreFailurePolicy,
}

impl AdmissionGate {
    pub fn new(
        matcher: RuleMatcher,
        evaluator: SlidingWindowEvaluator,
        on_store_error: StoreFailurePolicy,
    ) -> Self {
        Self {
            matcher,
            evaluator,
            on_store_error,
        }
    }

    /// Decide admission for a request.
    ///
    /// Only store failures are returned as errors, so callers can pick
    /// their own failure policy.
    pub async fn check(&self, headers: &HeaderMap, path: &str) -> Result<Admission> {
        let identity = match extract_identity(headers) {
            Ok(identity) => identity,
            Err(reason) => {
                debug!(path = %path, reason = %reason, "Request has no usable identity");
                return Ok(Admission::Unauthenticated(reason));
            }
        };

        let rules = self.matcher.applicable_rules(path);
        if rules.is_empty() {
            debug!(path = %path, "No rate limit rules apply");
            return Ok(Admission::Admitted(None));
        }

        match self.evaluator.evaluate(identity.as_str(), &rules).await? {
            Some(result) if !result.allowed => Ok(Admission::Limited(result)),
            status => Ok(Admission::Admitted(status)),
        }
    }

    /// Run admission control and hand admitted requests to `next`.
    ///
    /// Store failures are resolved here according to the configured
    /// [`StoreFailurePolicy`].
    pub async fn process<B, F, Fut>(&self, request: Request<B>, next: F) -> Response
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let path = request.uri().path().to_owned();

        let admission = self.check(request.headers(), &path).await;
        match admission {
            Ok(Admission::Admitted(status)) => {
                metrics::record_decision("admitted");
                let response = next(request).await;
                match status {
                    Some(status) => add_rate_limit_headers(response, &status),
                    None => response,
                }
            }
            Ok(Admission::Limited(result)) => {
                metrics::record_decision("limited");
                metrics::record_rate_limit_exceeded(&result.path_key);
                create_rate_limit_response(&result)
            }
            Ok(Admission::Unauthenticated(reason)) => {
                metrics::record_decision("unauthenticated");
                warn!(path = %path, reason = %reason, "Rejecting unauthenticated request");
                GateError::Unauthenticated(reason).into_response()
            }
            Err(e) => match self.on_store_error {
                StoreFailurePolicy::FailOpen => {
                    metrics::record_decision("store_error_forwarded");
                    error!(path = %path, error = %e, "Rate limit store failed, forwarding request");
                    next(request).await
                }
                StoreFailurePolicy::FailClosed => {
                    metrics::record_decision("store_error_rejected");
                    error!(path = %path, error = %e, "Rate limit store failed, rejecting request");
                    e.into_response()
                }
            },
        }
    }

    pub fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }

    pub fn on_store_error(&self) -> StoreFailurePolicy {
        self.on_store_error
    }
}
