//! Config Resolver
//!
//! Resolves the tier rule that applies to a service. Custom configs in the
//! config store take precedence over the compiled default table; within a
//! config an unknown tier falls back to the "default" rule.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::defaults::{self, DefaultTable};
use super::error::{QuotaError, QuotaResult};
use super::store::ConfigStore;
use super::types::{ServiceConfig, TierRule, DEFAULT_TIER};
use crate::metrics::QUOTA_STORE_ERRORS_TOTAL;

/// Resolver over a config store and a compiled default table
#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn ConfigStore>,
    defaults: DefaultTable,
}

impl ConfigResolver {
    /// Create a resolver
    pub fn new(store: Arc<dyn ConfigStore>, defaults: DefaultTable) -> Self {
        Self { store, defaults }
    }

    /// Compiled default table
    pub fn defaults(&self) -> &DefaultTable {
        &self.defaults
    }

    /// Config in effect for a service: custom if persisted, else compiled default
    ///
    /// # Errors
    ///
    /// `ConfigNotFound` when neither exists; `Store` when the lookup fails.
    pub async fn effective_config(&self, service_id: &str) -> QuotaResult<ServiceConfig> {
        let custom = self.store.get(service_id).await.inspect_err(|_| {
            QUOTA_STORE_ERRORS_TOTAL.with_label_values(&["config_get"]).inc();
        })?;

        if let Some(config) = custom {
            return Ok(config);
        }

        self.defaults
            .get(service_id)
            .cloned()
            .ok_or_else(|| QuotaError::ConfigNotFound(service_id.to_string()))
    }

    /// Rule for `tier` in `service_id`, falling back to the "default" rule
    ///
    /// # Errors
    ///
    /// `ConfigNotFound` for an unknown service, `RuleNotFound` when the config
    /// has neither `tier` nor "default".
    pub async fn resolve(&self, service_id: &str, tier: &str) -> QuotaResult<TierRule> {
        let config = self.effective_config(service_id).await?;

        let rule = config
            .rule_for(tier)
            .copied()
            .ok_or_else(|| QuotaError::RuleNotFound {
                service_id: service_id.to_string(),
                tier: tier.to_string(),
            })?;

        debug!(
            service = service_id,
            tier,
            window_ms = rule.window_ms,
            max_requests = rule.max_requests,
            "Resolved tier rule"
        );
        Ok(rule)
    }

    /// Check a config against the structural constraints, reporting the first violation
    pub fn validate(config: &ServiceConfig) -> QuotaResult<()> {
        if config.service_id.trim().is_empty() {
            return Err(QuotaError::Validation(
                "serviceId must be a non-empty string".to_string(),
            ));
        }
        if config.rules.is_empty() {
            return Err(QuotaError::Validation(format!(
                "rules for service '{}' must not be empty",
                config.service_id
            )));
        }
        if !config.rules.contains_key(DEFAULT_TIER) {
            return Err(QuotaError::Validation(format!(
                "rules for service '{}' must include a '{}' tier",
                config.service_id, DEFAULT_TIER
            )));
        }
        for (tier, rule) in &config.rules {
            if tier.trim().is_empty() {
                return Err(QuotaError::Validation(format!(
                    "service '{}' has an empty tier name",
                    config.service_id
                )));
            }
            if rule.window_ms == 0 {
                return Err(QuotaError::Validation(format!(
                    "tier '{}' of service '{}': windowMs must be > 0",
                    tier, config.service_id
                )));
            }
            if rule.max_requests == 0 {
                return Err(QuotaError::Validation(format!(
                    "tier '{}' of service '{}': maxRequests must be > 0",
                    tier, config.service_id
                )));
            }
        }
        Ok(())
    }

    /// Validate and persist a custom config, overwriting any existing entry
    pub async fn save(&self, config: ServiceConfig) -> QuotaResult<()> {
        Self::validate(&config)?;

        let service_id = config.service_id.clone();
        self.store.put(config).await.inspect_err(|_| {
            QUOTA_STORE_ERRORS_TOTAL.with_label_values(&["config_put"]).inc();
        })?;

        info!(service = %service_id, "Saved custom quota configuration");
        Ok(())
    }

    /// Whether a persisted config exists; store errors read as `false`
    pub async fn has_custom(&self, service_id: &str) -> bool {
        match self.store.get(service_id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                QUOTA_STORE_ERRORS_TOTAL.with_label_values(&["config_get"]).inc();
                warn!(service = service_id, error = %e, "Custom config lookup failed");
                false
            }
        }
    }

    /// Persisted configs plus compiled defaults for services not persisted
    ///
    /// Sorted by service id.
    pub async fn list_all(&self) -> QuotaResult<Vec<ServiceConfig>> {
        let mut configs = self.store.list_all().await.inspect_err(|_| {
            QUOTA_STORE_ERRORS_TOTAL.with_label_values(&["config_list"]).inc();
        })?;

        let persisted: HashSet<String> = configs.iter().map(|c| c.service_id.clone()).collect();
        configs.extend(
            self.defaults
                .configs()
                .into_iter()
                .filter(|c| !persisted.contains(&c.service_id)),
        );

        configs.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        Ok(configs)
    }

    /// Synthesize and persist the baseline three-tier config
    pub async fn create_default(&self, service_id: &str) -> QuotaResult<ServiceConfig> {
        let config = defaults::baseline(service_id);
        self.save(config.clone()).await?;
        Ok(config)
    }

    /// Remove a custom config so the service reverts to its compiled default
    pub async fn delete(&self, service_id: &str) -> QuotaResult<bool> {
        let removed = self.store.delete(service_id).await.inspect_err(|_| {
            QUOTA_STORE_ERRORS_TOTAL.with_label_values(&["config_delete"]).inc();
        })?;

        if removed {
            info!(service = service_id, "Deleted custom quota configuration");
        }
        Ok(removed)
    }
}
