use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned by a rule registry backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry unreachable: {0}")]
    Unreachable(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("registry returned status {status} for collection {collection}")]
    Status { collection: String, status: u16 },

    #[error("malformed registry response: {0}")]
    Malformed(String),
}

/// One document returned by a match-all query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleHit {
    pub rule_name: String,
}

impl RuleHit {
    pub fn new(rule_name: impl Into<String>) -> Self {
        RuleHit {
            rule_name: rule_name.into(),
        }
    }
}

/// Searchable document store holding enabled rules, one collection per category.
#[async_trait]
pub trait RuleRegistry: Send + Sync {
    /// Match-all query against a collection, returning at most `limit` hits.
    async fn search(&self, collection: &str, limit: u32) -> Result<Vec<RuleHit>, RegistryError>;

    /// Whether a collection exists.
    async fn exists(&self, collection: &str) -> Result<bool, RegistryError>;

    /// Connectivity check. Never errors; unreachable is `false`.
    async fn ping(&self) -> bool;
}
