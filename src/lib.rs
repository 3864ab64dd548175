//! Quota Engine Library
//!
//! Multi-tenant quota decisions for (service, client) pairs under per-service,
//! per-tier sliding window limits, with configuration resolution, admin
//! operations, batch evaluation and Prometheus metrics.

pub mod config;
pub mod metrics;
pub mod metrics_server;
pub mod quota;

pub use quota::{
    AdminOps, BatchEvaluator, ConfigResolver, FailurePolicy, QuotaDecision, QuotaEngine,
    QuotaError, QuotaRequest, ServiceConfig, TierRule,
};
