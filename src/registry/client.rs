use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{Category, CategoryTable, RuleRecord};

use super::traits::{RegistryError, RuleRegistry};

/// Fetches enabled rules per category from a registry backend.
///
/// Shared across requests; holds no mutable state.
#[derive(Clone)]
pub struct RuleRegistryClient {
    registry: Arc<dyn RuleRegistry>,
    max_results: u32,
}

impl RuleRegistryClient {
    pub fn new(registry: Arc<dyn RuleRegistry>, max_results: u32) -> Self {
        RuleRegistryClient {
            registry,
            max_results,
        }
    }

    /// Connectivity check.
    pub async fn ping(&self) -> bool {
        self.registry.ping().await
    }

    /// Enabled rules for one category.
    pub async fn fetch_enabled_rules(
        &self,
        category: Category,
        collection: &str,
    ) -> Result<Vec<RuleRecord>, RegistryError> {
        let hits = self.registry.search(collection, self.max_results).await?;

        Ok(hits
            .into_iter()
            .map(|hit| RuleRecord::new(category, hit.rule_name))
            .collect())
    }

    /// Enabled rules for every category in the table.
    ///
    /// Categories are queried concurrently and independently. A failing
    /// category contributes no records; the rest are unaffected. Output
    /// follows table order.
    pub async fn fetch_all(&self, table: &CategoryTable) -> Vec<RuleRecord> {
        let queries = table.iter().map(|(category, collection)| async move {
            (category, collection, self.fetch_enabled_rules(category, collection).await)
        });

        let mut records = Vec::new();
        for (category, collection, result) in join_all(queries).await {
            match result {
                Ok(rules) => {
                    debug!(
                        category = %category,
                        collection = collection,
                        rules = rules.len(),
                        "Fetched enabled rules"
                    );
                    records.extend(rules);
                }
                Err(e) => {
                    warn!(
                        category = %category,
                        collection = collection,
                        error = %e,
                        "Failed to fetch enabled rules, skipping category"
                    );
                }
            }
        }

        records
    }
}
