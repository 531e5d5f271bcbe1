//! Error taxonomy for cost collection and recommendation runs
//!
//! Every variant is scoped to the unit it affects: a malformed offer only
//! drops that offer, a credential failure only skips that account, and so on.
//! Plumbing code carries these inside `anyhow::Error` and downcasts where the
//! distinction matters.

use thiserror::Error;

/// Result type alias for domain operations
pub type FinopsResult<T> = Result<T, FinopsError>;

#[derive(Debug, Error)]
pub enum FinopsError {
    /// A raw price-list record does not match its product family's schema
    #[error("malformed offer in '{family}' ({key}): {reason}")]
    MalformedOffer {
        family: String,
        key: String,
        reason: String,
    },

    /// Delegated credentials for an account could not be obtained
    #[error("could not assume role '{role}' in account {account}: {reason}")]
    CredentialAssumption {
        account: String,
        role: String,
        reason: String,
    },

    /// A metric series could not be retrieved
    #[error("metric {metric} unavailable for {resource}: {reason}")]
    MetricUnavailable {
        resource: String,
        metric: String,
        reason: String,
    },

    /// No backup snapshot exists for a resource yet
    #[error("no snapshot available for {0}")]
    NoSnapshot(String),

    /// A metric or chat sink rejected a value
    #[error("publish failed: {0}")]
    Publish(String),

    /// The price list for a product family could not be fetched
    #[error("price list for '{family}' unavailable: {reason}")]
    PriceList { family: String, reason: String },

    /// The resource inventory could not be listed
    #[error("inventory error: {0}")]
    Inventory(String),

    /// Invalid process configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl FinopsError {
    pub fn malformed(
        family: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        FinopsError::MalformedOffer {
            family: family.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Failures that stand for "no data yet" and are consumed as zero
    pub fn is_missing_data(&self) -> bool {
        matches!(
            self,
            FinopsError::MetricUnavailable { .. } | FinopsError::NoSnapshot(_)
        )
    }
}
