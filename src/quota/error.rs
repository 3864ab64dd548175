//! Quota Engine Error Types
//!
//! This module defines all error types that can occur while evaluating or
//! administering quotas.

/// Error types for the backing stores (usage log and config store)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store rejected or failed the operation
    #[error("Store operation '{operation}' failed: {message}")]
    Operation {
        /// Operation name (query, append, purge, get, put, list, delete)
        operation: &'static str,
        /// Backend error message
        message: String,
    },
}

impl StoreError {
    /// Create an operation failure
    pub fn operation(operation: &'static str, message: impl Into<String>) -> Self {
        StoreError::Operation {
            operation,
            message: message.into(),
        }
    }
}

/// Error types for quota operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    /// Malformed request or config
    #[error("Validation error: {0}")]
    Validation(String),

    /// No custom or compiled config exists for the service
    #[error("No configuration found for service '{0}'")]
    ConfigNotFound(String),

    /// Neither the requested tier nor "default" exists in the service config
    #[error("No rule for tier '{tier}' (and no default rule) in service '{service_id}'")]
    RuleNotFound {
        /// Service being resolved
        service_id: String,
        /// Tier that was requested
        tier: String,
    },

    /// Usage or config store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QuotaError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            QuotaError::Validation(_) => "validation",
            QuotaError::ConfigNotFound(_) => "config_not_found",
            QuotaError::RuleNotFound { .. } => "rule_not_found",
            QuotaError::Store(_) => "store",
        }
    }
}

/// Result alias for quota operations
pub type QuotaResult<T> = Result<T, QuotaError>;
