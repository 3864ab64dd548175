//! Compiled Default Service Configurations
//!
//! Services listed here resolve without any persisted config. The table can
//! be extended or overridden from the configuration file at startup; such
//! entries are still defaults, never custom configs.

use std::collections::{BTreeMap, HashMap};

use super::types::{ServiceConfig, TierRule, DEFAULT_TIER};

/// Window used by every built-in rule (one minute)
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Baseline limits synthesized by `ConfigResolver::create_default`
pub const BASELINE_DEFAULT_LIMIT: u32 = 100;
pub const BASELINE_PRO_LIMIT: u32 = 1_000;
pub const BASELINE_ENTERPRISE_LIMIT: u32 = 10_000;

/// Tier labels recognized when none are configured
pub const STANDARD_TIERS: [&str; 3] = [DEFAULT_TIER, "pro", "enterprise"];

/// Build a three-tier config over the standard one-minute window
pub fn three_tier(service_id: &str, default: u32, pro: u32, enterprise: u32) -> ServiceConfig {
    ServiceConfig::new(service_id)
        .with_rule(DEFAULT_TIER, TierRule::new(DEFAULT_WINDOW_MS, default))
        .with_rule("pro", TierRule::new(DEFAULT_WINDOW_MS, pro))
        .with_rule("enterprise", TierRule::new(DEFAULT_WINDOW_MS, enterprise))
}

/// Baseline config persisted by `create_default`
pub fn baseline(service_id: &str) -> ServiceConfig {
    three_tier(
        service_id,
        BASELINE_DEFAULT_LIMIT,
        BASELINE_PRO_LIMIT,
        BASELINE_ENTERPRISE_LIMIT,
    )
}

/// Lookup table of compiled default configs keyed by service id
#[derive(Debug, Clone, Default)]
pub struct DefaultTable {
    configs: HashMap<String, ServiceConfig>,
}

impl DefaultTable {
    /// Table with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table with the built-in services
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.insert(three_tier("api", 100, 1_000, 10_000));
        table.insert(three_tier("uploads", 5, 50, 500));
        table.insert(three_tier("auth", 10, 20, 50));
        table
    }

    /// Built-in table extended with per-service tier tables from the config file
    ///
    /// Tiers from `overrides` replace built-in tiers of the same name; other
    /// built-in tiers of the service are kept.
    pub fn with_overrides(overrides: &HashMap<String, BTreeMap<String, TierRule>>) -> Self {
        let mut table = Self::builtin();
        for (service_id, rules) in overrides {
            let entry = table
                .configs
                .entry(service_id.clone())
                .or_insert_with(|| ServiceConfig::new(service_id.clone()));
            entry
                .rules
                .extend(rules.iter().map(|(tier, rule)| (tier.clone(), *rule)));
        }
        table
    }

    /// Add or replace an entry
    pub fn insert(&mut self, config: ServiceConfig) {
        self.configs.insert(config.service_id.clone(), config);
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceConfig> {
        self.configs.get(service_id)
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.configs.contains_key(service_id)
    }

    /// All entries, sorted by service id
    pub fn configs(&self) -> Vec<ServiceConfig> {
        let mut configs: Vec<_> = self.configs.values().cloned().collect();
        configs.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        configs
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
