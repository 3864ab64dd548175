//! Quota Engine Module
//!
//! Multi-tenant admission control: given a (service, client) pair, decide
//! whether a request may proceed under the service's per-tier limits and
//! report when the quota resets.
//!
//! # Features
//!
//! - Trailing fixed-size window recomputed from "now" on every call
//! - Per-service tier rules with fallback to the "default" tier
//! - Custom configs that override a compiled default table
//! - Admin reset and config preload, concurrent batch evaluation
//! - One failure policy for every fail-open read helper
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          AdminOps              BatchEvaluator                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       QuotaEngine                            │
//! │   validate → resolve → window query → decide → append        │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │       ConfigResolver         │                               │
//! │  ┌────────────┐ ┌──────────┐ │         UsageStore            │
//! │  │ConfigStore │ │ Defaults │ │   (append log, TTL eviction)  │
//! │  └────────────┘ └──────────┘ │                               │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```

pub mod admin;
pub mod batch;
pub mod clock;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod policy;
pub mod resolver;
pub mod store;
pub mod types;

#[cfg(test)]
mod proptests;

pub use admin::{AdminOps, PreloadReport};
pub use batch::BatchEvaluator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use defaults::DefaultTable;
pub use engine::{EngineOptions, QuotaEngine};
pub use error::{QuotaError, QuotaResult, StoreError};
pub use policy::FailurePolicy;
pub use resolver::ConfigResolver;
pub use store::{ConfigStore, MemoryConfigStore, MemoryUsageStore, UsageStore};
pub use types::{
    QuotaDecision, QuotaRequest, QuotaResponse, ServiceConfig, TierRule, UsageKey, UsageRecord,
    UsageStats,
};
