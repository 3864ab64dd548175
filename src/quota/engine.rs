//! Quota Engine
//!
//! Evaluates admission requests against a trailing window of usage records.
//!
//! The window is recomputed from "now" on every call: records with
//! `timestamp >= now - windowMs` are counted, and the request is admitted
//! when that count is below `maxRequests`. Admitted requests append one
//! record; denied requests append nothing.
//!
//! The count and the append are separate store operations. Concurrent
//! evaluations for the same key can each observe the same count and all be
//! admitted, so a window may briefly hold more than `maxRequests` records.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::clock::Clock;
use super::defaults::STANDARD_TIERS;
use super::error::{QuotaError, QuotaResult};
use super::policy::FailurePolicy;
use super::resolver::ConfigResolver;
use super::store::UsageStore;
use super::types::{
    QuotaDecision, QuotaRequest, TierRule, UsageKey, UsageRecord, UsageStats, DEFAULT_TIER,
};
use crate::metrics::{
    QUOTA_DECISIONS_TOTAL, QUOTA_EVALUATE_DURATION_SECONDS, QUOTA_STORE_ERRORS_TOTAL,
};

/// Default retention for usage records (24 hours)
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Tunables for a `QuotaEngine`
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Tier labels a request may name
    pub tiers: Vec<String>,

    /// How long admitted records are kept before they may be purged
    pub retention: Duration,

    /// Behavior of the fail-open read helpers
    pub failure_policy: FailurePolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tiers: STANDARD_TIERS.iter().map(|t| t.to_string()).collect(),
            retention: DEFAULT_RETENTION,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Usage of one key inside the current window
#[derive(Debug, Clone)]
struct WindowSnapshot {
    now: i64,
    rule: TierRule,
    current_usage: u32,
    oldest: Option<i64>,
}

impl WindowSnapshot {
    fn remaining(&self) -> u32 {
        self.rule.max_requests.saturating_sub(self.current_usage)
    }

    fn reset_at(&self) -> i64 {
        self.now.saturating_add(self.rule.window_millis())
    }

    /// Whole seconds until the oldest record leaves the window (at least 1)
    fn retry_after_secs(&self) -> Option<u64> {
        let oldest = self.oldest?;
        let wait_ms = oldest
            .saturating_add(self.rule.window_millis())
            .saturating_sub(self.now)
            .max(0);
        let secs = u64::try_from(wait_ms).unwrap_or(0).div_ceil(1_000);
        Some(secs.max(1))
    }
}

/// Quota engine with injected resolver, usage store and clock
#[derive(Clone)]
pub struct QuotaEngine {
    resolver: ConfigResolver,
    usage: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
}

impl QuotaEngine {
    /// Create an engine with default options
    pub fn new(resolver: ConfigResolver, usage: Arc<dyn UsageStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver,
            usage,
            clock,
            options: EngineOptions::default(),
        }
    }

    /// Replace the engine options
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn usage_store(&self) -> &Arc<dyn UsageStore> {
        &self.usage
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.options.failure_policy
    }

    /// Validate a request and return its effective tier
    ///
    /// # Errors
    ///
    /// `Validation` when serviceId or clientId is empty, or when a tier is
    /// named that is not one of the recognized labels.
    pub fn validate(&self, request: &QuotaRequest) -> QuotaResult<String> {
        if request.service_id.trim().is_empty() {
            return Err(QuotaError::Validation(
                "serviceId is required and must be a non-empty string".to_string(),
            ));
        }
        if request.client_id.trim().is_empty() {
            return Err(QuotaError::Validation(
                "clientId is required and must be a non-empty string".to_string(),
            ));
        }

        if let Some(value) = request.metadata_tier() {
            let tier = value.as_str().ok_or_else(|| {
                QuotaError::Validation("metadata.tier must be a string".to_string())
            })?;
            self.check_tier(tier)?;
        }

        match request.requested_tier() {
            None => Ok(DEFAULT_TIER.to_string()),
            Some(tier) => {
                self.check_tier(tier)?;
                Ok(tier.to_string())
            }
        }
    }

    fn check_tier(&self, tier: &str) -> QuotaResult<()> {
        if self.options.tiers.iter().any(|t| t == tier) {
            return Ok(());
        }
        Err(QuotaError::Validation(format!(
            "Unrecognized tier '{}'. Must be one of: {}",
            tier,
            self.options.tiers.join(", ")
        )))
    }

    async fn snapshot(&self, key: &UsageKey, tier: &str) -> QuotaResult<WindowSnapshot> {
        let rule = self.resolver.resolve(&key.service_id, tier).await?;

        let now = self.clock.now_millis();
        let window_start = now.saturating_sub(rule.window_millis());

        let records = self.usage.query(key, window_start).await.inspect_err(|_| {
            QUOTA_STORE_ERRORS_TOTAL.with_label_values(&["query"]).inc();
        })?;

        Ok(WindowSnapshot {
            now,
            rule,
            current_usage: u32::try_from(records.len()).unwrap_or(u32::MAX),
            oldest: records.iter().map(|r| r.timestamp).min(),
        })
    }

    /// Decide whether a request may proceed, recording it if admitted
    ///
    /// # Errors
    ///
    /// Validation, config and store failures propagate unchanged.
    pub async fn evaluate(&self, request: &QuotaRequest) -> QuotaResult<QuotaDecision> {
        let _timer = QUOTA_EVALUATE_DURATION_SECONDS.start_timer();

        let tier = self.validate(request)?;
        let key = request.key();
        let window = self.snapshot(&key, &tier).await?;

        let allowed = window.current_usage < window.rule.max_requests;

        let decision = if allowed {
            let expires_at = window
                .now
                .saturating_add(self.retention_millis(&window.rule));
            self.usage
                .append(UsageRecord::new(key.clone(), window.now, expires_at))
                .await
                .inspect_err(|_| {
                    QUOTA_STORE_ERRORS_TOTAL.with_label_values(&["append"]).inc();
                })?;

            QuotaDecision {
                allowed: true,
                remaining: window.remaining().saturating_sub(1),
                reset_at: window.reset_at(),
                retry_after_secs: None,
                service_id: request.service_id.clone(),
                tier,
                rule: window.rule,
            }
        } else {
            QuotaDecision {
                allowed: false,
                remaining: window.remaining(),
                reset_at: window.reset_at(),
                retry_after_secs: window.retry_after_secs(),
                service_id: request.service_id.clone(),
                tier,
                rule: window.rule,
            }
        };

        let outcome = if decision.allowed { "allowed" } else { "denied" };
        QUOTA_DECISIONS_TOTAL
            .with_label_values(&[request.service_id.as_str(), outcome])
            .inc();

        debug!(
            service = %request.service_id,
            client = %request.client_id,
            tier = %decision.tier,
            current_usage = window.current_usage,
            max_requests = window.rule.max_requests,
            remaining = decision.remaining,
            outcome,
            "Evaluated quota request"
        );

        Ok(decision)
    }

    /// Current window for a client without consuming quota
    pub async fn usage_stats(
        &self,
        service_id: &str,
        client_id: &str,
        tier: Option<&str>,
    ) -> QuotaResult<UsageStats> {
        let mut request = QuotaRequest::new(service_id, client_id);
        request.tier = tier.map(str::to_string);
        let tier = self.validate(&request)?;

        let window = self.snapshot(&request.key(), &tier).await?;

        Ok(UsageStats {
            service_id: service_id.to_string(),
            client_id: client_id.to_string(),
            tier,
            current_usage: window.current_usage,
            max_requests: window.rule.max_requests,
            remaining: window.remaining(),
            window_ms: window.rule.window_ms,
            reset_at: window.reset_at(),
        })
    }

    /// Whether the client has no admissions left
    ///
    /// Errors are answered by the engine's failure policy (`false` when open).
    pub async fn is_blocked(&self, service_id: &str, client_id: &str, tier: Option<&str>) -> bool {
        let result = self
            .usage_stats(service_id, client_id, tier)
            .await
            .map(|stats| stats.remaining == 0);
        self.options.failure_policy.resolve_blocked(result)
    }

    /// Time until the client's window fully clears; zero on error
    pub async fn time_until_reset(
        &self,
        service_id: &str,
        client_id: &str,
        tier: Option<&str>,
    ) -> Duration {
        match self.usage_stats(service_id, client_id, tier).await {
            Ok(stats) => {
                let ms = stats.reset_at.saturating_sub(self.clock.now_millis()).max(0);
                Duration::from_millis(u64::try_from(ms).unwrap_or(0))
            }
            Err(e) => {
                tracing::warn!(
                    service = service_id,
                    client = client_id,
                    error = %e,
                    "Reset time lookup failed; reporting zero"
                );
                Duration::ZERO
            }
        }
    }

    fn retention_millis(&self, rule: &TierRule) -> i64 {
        let retention = self.options.retention.max(rule.window());
        i64::try_from(retention.as_millis()).unwrap_or(i64::MAX)
    }
}
