//! Quota Data Model
//!
//! Requests, tier rules, service configurations, usage records and the
//! decisions produced by the engine. All instants are milliseconds since the
//! Unix epoch.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Name of the fallback tier every service config must carry
pub const DEFAULT_TIER: &str = "default";

/// Metadata key that may carry the requested tier
pub const TIER_METADATA_KEY: &str = "tier";

/// A single admission request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRequest {
    /// Service being rate limited (e.g. "uploads")
    pub service_id: String,

    /// Opaque client identifier (e.g. "ip:1.2.3.4", "user:42")
    pub client_id: String,

    /// Requested tier; falls back to `metadata["tier"]`, then "default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,

    /// Opaque caller metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl QuotaRequest {
    /// Create a request on the default tier
    pub fn new(service_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            client_id: client_id.into(),
            tier: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the requested tier
    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Raw `metadata["tier"]` entry, if present
    pub fn metadata_tier(&self) -> Option<&serde_json::Value> {
        self.metadata.get(TIER_METADATA_KEY)
    }

    /// Tier named by the caller, if any
    pub fn requested_tier(&self) -> Option<&str> {
        self.tier
            .as_deref()
            .or_else(|| self.metadata_tier().and_then(serde_json::Value::as_str))
    }

    /// Usage log key for this request
    pub fn key(&self) -> UsageKey {
        UsageKey::new(&self.service_id, &self.client_id)
    }
}

/// Window size and admission ceiling for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TierRule {
    /// Length of the trailing window in milliseconds
    #[serde(rename = "windowMs", alias = "window_ms")]
    pub window_ms: u64,

    /// Maximum admissions within the window
    #[serde(rename = "maxRequests", alias = "max_requests")]
    pub max_requests: u32,
}

impl TierRule {
    /// Create a new rule
    pub const fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    /// Window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Window length as signed milliseconds for timestamp arithmetic
    pub(crate) fn window_millis(&self) -> i64 {
        i64::try_from(self.window_ms).unwrap_or(i64::MAX)
    }
}

/// Per-service mapping of tier name to rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Service identifier
    pub service_id: String,

    /// Rules keyed by tier name; must contain "default"
    pub rules: BTreeMap<String, TierRule>,
}

impl ServiceConfig {
    /// Create an empty config for a service
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            rules: BTreeMap::new(),
        }
    }

    /// Add or replace a tier rule
    pub fn with_rule(mut self, tier: impl Into<String>, rule: TierRule) -> Self {
        self.rules.insert(tier.into(), rule);
        self
    }

    /// Rule for `tier`, falling back to the "default" rule
    pub fn rule_for(&self, tier: &str) -> Option<&TierRule> {
        self.rules
            .get(tier)
            .or_else(|| self.rules.get(DEFAULT_TIER))
    }

    /// The "default" rule, if present
    pub fn default_rule(&self) -> Option<&TierRule> {
        self.rules.get(DEFAULT_TIER)
    }
}

/// Composite key of a usage log
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageKey {
    /// Service identifier
    pub service_id: String,

    /// Client identifier
    pub client_id: String,
}

impl UsageKey {
    /// Create a new usage key
    pub fn new(service_id: &str, client_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            client_id: client_id.to_string(),
        }
    }
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service_id, self.client_id)
    }
}

/// One admitted request in a usage log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Owning key
    pub key: UsageKey,

    /// Admission instant (ms since epoch)
    pub timestamp: i64,

    /// Instant after which the record may be purged
    pub expires_at: i64,
}

impl UsageRecord {
    /// Create a new record
    pub fn new(key: UsageKey, timestamp: i64, expires_at: i64) -> Self {
        Self {
            key,
            timestamp,
            expires_at,
        }
    }

    /// Whether the record is past its retention
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Admissions left in the window after this request
    pub remaining: u32,

    /// Instant at which the window fully clears if no further requests occur
    pub reset_at: i64,

    /// Seconds to wait before retrying (denied requests with usage only)
    pub retry_after_secs: Option<u64>,

    /// Service the decision applies to
    pub service_id: String,

    /// Tier label the rule was resolved for
    pub tier: String,

    /// Rule applied
    pub rule: TierRule,
}

impl QuotaDecision {
    /// Boundary representation of this decision
    pub fn to_response(&self) -> QuotaResponse {
        QuotaResponse {
            allowed: self.allowed,
            remaining: self.remaining,
            reset_time: format_millis(self.reset_at),
            retry_after: self.retry_after_secs,
            metadata: DecisionMetadata {
                service_id: self.service_id.clone(),
                window_ms: self.rule.window_ms,
                max_requests: self.rule.max_requests,
            },
        }
    }
}

/// JSON shape handed to the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Admissions left in the window
    pub remaining: u32,

    /// RFC 3339 reset instant
    pub reset_time: String,

    /// Seconds until a retry may succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    /// Rule that produced the decision
    pub metadata: DecisionMetadata,
}

/// Rule details echoed in a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionMetadata {
    pub service_id: String,
    pub window_ms: u64,
    pub max_requests: u32,
}

/// Read-only view of a client's window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    /// Service identifier
    pub service_id: String,

    /// Client identifier
    pub client_id: String,

    /// Tier the rule was resolved for
    pub tier: String,

    /// Records currently inside the window
    pub current_usage: u32,

    /// Admission ceiling
    pub max_requests: u32,

    /// Admissions left before denial
    pub remaining: u32,

    /// Window length in milliseconds
    pub window_ms: u64,

    /// Instant at which the window fully clears (ms since epoch)
    pub reset_at: i64,
}

/// Render an epoch-millisecond instant as RFC 3339 UTC
pub fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_tier_prefers_field() {
        let req = QuotaRequest::new("api", "user:1")
            .with_tier("pro")
            .with_metadata("tier", "enterprise");
        assert_eq!(req.requested_tier(), Some("pro"));

        let req = QuotaRequest::new("api", "user:1").with_metadata("tier", "enterprise");
        assert_eq!(req.requested_tier(), Some("enterprise"));

        assert_eq!(QuotaRequest::new("api", "user:1").requested_tier(), None);
    }

    #[test]
    fn test_request_metadata_accepts_any_json() {
        let req: QuotaRequest = serde_json::from_str(
            r#"{"serviceId": "api", "clientId": "user:1",
                "metadata": {"priority": 1, "tags": ["a"], "tier": "pro"}}"#,
        )
        .unwrap();

        assert_eq!(req.metadata["priority"], 1);
        assert_eq!(req.requested_tier(), Some("pro"));

        let numeric_tier = QuotaRequest::new("api", "user:1").with_metadata("tier", 3);
        assert_eq!(numeric_tier.requested_tier(), None);
        assert!(numeric_tier.metadata_tier().is_some());
    }

    #[test]
    fn test_rule_for_falls_back_to_default() {
        let config = ServiceConfig::new("uploads")
            .with_rule("default", TierRule::new(60_000, 5))
            .with_rule("pro", TierRule::new(60_000, 50));

        assert_eq!(config.rule_for("pro"), Some(&TierRule::new(60_000, 50)));
        assert_eq!(config.rule_for("gold"), Some(&TierRule::new(60_000, 5)));

        let no_default = ServiceConfig::new("x").with_rule("pro", TierRule::new(1_000, 1));
        assert_eq!(no_default.rule_for("gold"), None);
    }

    #[test]
    fn test_tier_rule_json_field_names() {
        let json = serde_json::to_value(TierRule::new(60_000, 5)).unwrap();
        assert_eq!(json["windowMs"], 60_000);
        assert_eq!(json["maxRequests"], 5);

        let parsed: TierRule =
            serde_json::from_str(r#"{"window_ms": 1000, "max_requests": 2}"#).unwrap();
        assert_eq!(parsed, TierRule::new(1_000, 2));
    }

    #[test]
    fn test_response_shape() {
        let decision = QuotaDecision {
            allowed: false,
            remaining: 0,
            reset_at: 60_000,
            retry_after_secs: Some(12),
            service_id: "uploads".to_string(),
            tier: "default".to_string(),
            rule: TierRule::new(60_000, 5),
        };
        let json = serde_json::to_value(decision.to_response()).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["resetTime"], "1970-01-01T00:01:00.000Z");
        assert_eq!(json["retryAfter"], 12);
        assert_eq!(json["metadata"]["serviceId"], "uploads");
        assert_eq!(json["metadata"]["windowMs"], 60_000);
        assert_eq!(json["metadata"]["maxRequests"], 5);
    }

    #[test]
    fn test_allowed_response_omits_retry_after() {
        let decision = QuotaDecision {
            allowed: true,
            remaining: 3,
            reset_at: 0,
            retry_after_secs: None,
            service_id: "api".to_string(),
            tier: "default".to_string(),
            rule: TierRule::new(1_000, 5),
        };
        let json = serde_json::to_value(decision.to_response()).unwrap();
        assert!(json.get("retryAfter").is_none());
    }

    #[test]
    fn test_record_expiry() {
        let record = UsageRecord::new(UsageKey::new("api", "c"), 100, 200);
        assert!(!record.is_expired(199));
        assert!(record.is_expired(200));
    }
}
