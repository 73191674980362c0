use super::types::{RateLimitRule, RateLimitRuleConfig};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Selects the rules that apply to a request path.
///
/// The rule table is immutable once built and cheap to clone.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    rules: Arc<[RateLimitRule]>,
}

impl RuleMatcher {
    pub fn new(rules: Vec<RateLimitRule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// Compile configured rules, failing on the first invalid one
    pub fn from_config(configs: &[RateLimitRuleConfig]) -> Result<Self> {
        let rules = configs
            .iter()
            .map(RateLimitRule::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules))
    }

    /// Rules matching `path`, keeping only the strictest rule per
    /// `(path_key, window_secs)`.
    pub fn applicable_rules(&self, path: &str) -> Vec<&RateLimitRule> {
        let mut matched: Vec<&RateLimitRule> =
            self.rules.iter().filter(|rule| rule.matches(path)).collect();

        // Stable, so equal limits keep configuration order
        matched.sort_by_key(|rule| rule.max_requests);

        let mut seen = HashSet::new();
        matched.retain(|&rule| seen.insert((rule.path_key.as_str(), rule.window_secs)));
        matched
    }

    pub fn rules(&self) -> &[RateLimitRule] {
        &self.rules
    }
}
