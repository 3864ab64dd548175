//! Failure Policy
//!
//! One place that decides what the read helpers and the boundary do when the
//! engine errors. `evaluate` and `reset` never consult it; they always
//! propagate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::error::QuotaError;
use super::types::{QuotaDecision, QuotaRequest, TierRule, DEFAULT_TIER};
use crate::metrics::QUOTA_FAIL_OPEN_TOTAL;

/// What to assume about a request when the engine cannot decide
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat the request as allowed
    #[default]
    Open,
    /// Treat the request as blocked
    Closed,
}

impl FailurePolicy {
    /// Value `is_blocked` reports when usage could not be read
    pub fn blocked_on_error(&self) -> bool {
        matches!(self, FailurePolicy::Closed)
    }

    /// Collapse an `is_blocked` lookup into a bool, logging swallowed errors
    pub fn resolve_blocked(&self, result: Result<bool, QuotaError>) -> bool {
        match result {
            Ok(blocked) => blocked,
            Err(e) => {
                warn!(error = %e, policy = %self, "Quota lookup failed; applying failure policy");
                if *self == FailurePolicy::Open {
                    QUOTA_FAIL_OPEN_TOTAL.inc();
                }
                self.blocked_on_error()
            }
        }
    }

    /// Turn an `evaluate` result into a decision for the boundary layer
    ///
    /// Errors become a synthetic decision: allowed under `Open`, denied under
    /// `Closed`. The synthetic decision carries a zero rule and no retry hint.
    pub fn guard(
        &self,
        request: &QuotaRequest,
        now: i64,
        result: Result<QuotaDecision, QuotaError>,
    ) -> QuotaDecision {
        match result {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    service = %request.service_id,
                    client = %request.client_id,
                    error = %e,
                    policy = %self,
                    "Quota evaluation failed; applying failure policy"
                );
                let allowed = *self == FailurePolicy::Open;
                if allowed {
                    QUOTA_FAIL_OPEN_TOTAL.inc();
                }
                QuotaDecision {
                    allowed,
                    remaining: 0,
                    reset_at: now,
                    retry_after_secs: None,
                    service_id: request.service_id.clone(),
                    tier: request
                        .requested_tier()
                        .unwrap_or(DEFAULT_TIER)
                        .to_string(),
                    rule: TierRule::new(0, 0),
                }
            }
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Open => write!(f, "open"),
            FailurePolicy::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(FailurePolicy::Open),
            "closed" => Ok(FailurePolicy::Closed),
            other => Err(format!(
                "Invalid failure policy: {}. Must be 'open' or 'closed'",
                other
            )),
        }
    }
}
