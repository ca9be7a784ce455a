use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::traits::{RegistryError, RuleHit, RuleRegistry};

/// In-memory registry for testing.
#[derive(Debug)]
pub struct MockRegistry {
    reachable: AtomicBool,
    collections: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    ping_failures_remaining: AtomicUsize,
    ping_calls: AtomicUsize,
    search_calls: AtomicUsize,
    exists_calls: AtomicUsize,
}

impl Default for MockRegistry {
    fn default() -> Self {
        MockRegistry {
            reachable: AtomicBool::new(true),
            collections: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            ping_failures_remaining: AtomicUsize::new(0),
            ping_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            exists_calls: AtomicUsize::new(0),
        }
    }
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection (for testing).
    pub fn create_collection(&self, collection: &str) {
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default();
    }

    /// Add an enabled rule, creating the collection if needed (for testing).
    pub fn add_rule(&self, collection: &str, rule_name: &str) {
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(rule_name.to_string());
    }

    /// Make searches against a collection fail (for testing).
    pub fn fail_collection(&self, collection: &str) {
        self.failing.lock().insert(collection.to_string());
    }

    /// Toggle connectivity (for testing).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next `n` pings, then recover (for testing).
    pub fn fail_next_pings(&self, n: usize) {
        self.ping_failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn ping_calls(&self) -> usize {
        self.ping_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleRegistry for MockRegistry {
    async fn search(&self, collection: &str, limit: u32) -> Result<Vec<RuleHit>, RegistryError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        if !self.is_reachable() {
            return Err(RegistryError::Unreachable("mock registry offline".to_string()));
        }
        if self.failing.lock().contains(collection) {
            return Err(RegistryError::Status {
                collection: collection.to_string(),
                status: 500,
            });
        }

        let collections = self.collections.lock();
        let rules = collections
            .get(collection)
            .ok_or_else(|| RegistryError::CollectionNotFound(collection.to_string()))?;

        Ok(rules
            .iter()
            .take(limit as usize)
            .map(RuleHit::new)
            .collect())
    }

    async fn exists(&self, collection: &str) -> Result<bool, RegistryError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);

        if !self.is_reachable() {
            return Err(RegistryError::Unreachable("mock registry offline".to_string()));
        }
        Ok(self.collections.lock().contains_key(collection))
    }

    async fn ping(&self) -> bool {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.ping_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.ping_failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return false;
        }
        self.is_reachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_respects_limit() {
        let registry = MockRegistry::new();
        registry.add_rule("analyzer-sqlis", "a");
        registry.add_rule("analyzer-sqlis", "b");
        registry.add_rule("analyzer-sqlis", "c");

        let hits = registry.search("analyzer-sqlis", 2).await.unwrap();
        assert_eq!(hits, vec![RuleHit::new("a"), RuleHit::new("b")]);
        assert_eq!(registry.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_and_failing_collections() {
        let registry = MockRegistry::new();
        registry.create_collection("analyzer-xsss");
        registry.fail_collection("analyzer-xsss");

        assert!(matches!(
            registry.search("analyzer-fus", 10).await,
            Err(RegistryError::CollectionNotFound(_))
        ));
        assert!(matches!(
            registry.search("analyzer-xsss", 10).await,
            Err(RegistryError::Status { status: 500, .. })
        ));
        assert_eq!(registry.exists("analyzer-xsss").await, Ok(true));
        assert_eq!(registry.exists("analyzer-fus").await, Ok(false));
    }

    #[tokio::test]
    async fn test_ping_failures_then_recovery() {
        let registry = MockRegistry::new();
        registry.fail_next_pings(2);

        assert!(!registry.ping().await);
        assert!(!registry.ping().await);
        assert!(registry.ping().await);
        assert_eq!(registry.ping_calls(), 3);
    }
}
