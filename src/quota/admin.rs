//! Administrative Quota Operations
//!
//! Out-of-band operations layered on the engine: force-resetting a client's
//! window, warming configs, and managing custom service configs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::engine::QuotaEngine;
use super::error::{QuotaError, QuotaResult};
use super::types::{ServiceConfig, UsageKey};
use crate::metrics::{QUOTA_RESETS_TOTAL, QUOTA_STORE_ERRORS_TOTAL};

/// Outcome of a config preload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadReport {
    /// Services whose effective config was read
    pub loaded: Vec<String>,

    /// Services that failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Admin operations over a shared engine
#[derive(Clone)]
pub struct AdminOps {
    engine: Arc<QuotaEngine>,
}

impl AdminOps {
    pub fn new(engine: Arc<QuotaEngine>) -> Self {
        Self { engine }
    }

    /// Delete every usage record of a client, returning how many were removed
    ///
    /// # Errors
    ///
    /// Store failures propagate; a reset that did not happen must be visible.
    pub async fn reset(&self, service_id: &str, client_id: &str) -> QuotaResult<usize> {
        if service_id.trim().is_empty() || client_id.trim().is_empty() {
            return Err(QuotaError::Validation(
                "serviceId and clientId are required to reset a quota".to_string(),
            ));
        }

        let key = UsageKey::new(service_id, client_id);
        // Include records stamped in the current millisecond
        let before = self.engine.now_millis().saturating_add(1);

        let purged = self
            .engine
            .usage_store()
            .purge(&key, before)
            .await
            .inspect_err(|_| {
                QUOTA_STORE_ERRORS_TOTAL.with_label_values(&["purge"]).inc();
            })?;

        QUOTA_RESETS_TOTAL.inc();
        info!(service = service_id, client = client_id, purged, "Reset client quota");
        Ok(purged)
    }

    /// Read the effective config of each service, logging and skipping failures
    pub async fn preload_configurations(&self, service_ids: &[String]) -> PreloadReport {
        let mut report = PreloadReport::default();

        for service_id in service_ids {
            match self.engine.resolver().effective_config(service_id).await {
                Ok(_) => report.loaded.push(service_id.clone()),
                Err(e) => {
                    warn!(service = %service_id, error = %e, "Failed to preload quota config");
                    report.failed.push((service_id.clone(), e.to_string()));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Preloaded quota configurations"
        );
        report
    }

    /// Persist a custom config for a service
    pub async fn override_config(&self, config: ServiceConfig) -> QuotaResult<()> {
        self.engine.resolver().save(config).await
    }

    /// Drop a service's custom config so it reverts to compiled defaults
    pub async fn revert_config(&self, service_id: &str) -> QuotaResult<bool> {
        self.engine.resolver().delete(service_id).await
    }
}
