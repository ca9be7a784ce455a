use reqwest::Url;

use crate::domain::{CategoryTable, ResolvedEndpoint, RuleRecord};
use crate::registry::RuleRegistryClient;

/// Build the analyzer endpoint for one rule record.
///
/// The category and rule name are appended as percent-encoded path segments
/// to `base`, so `http://analyzer:9947` + `(sqlis, rule1)` becomes
/// `http://analyzer:9947/sqlis/rule1`.
pub fn build_endpoint(base: &Url, record: &RuleRecord) -> ResolvedEndpoint {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .push(record.category.as_str())
            .push(&record.rule_name);
    }

    ResolvedEndpoint {
        category: record.category,
        rule_name: record.rule_name.clone(),
        url: url.into(),
    }
}

/// Turns the current registry state into concrete delivery targets.
///
/// Nothing is cached: each call re-reads the registry.
#[derive(Clone)]
pub struct EndpointResolver {
    registry: RuleRegistryClient,
    analyzer_base: Url,
}

impl EndpointResolver {
    pub fn new(registry: RuleRegistryClient, analyzer_base: Url) -> Self {
        EndpointResolver {
            registry,
            analyzer_base,
        }
    }

    /// Resolve every enabled rule of every category in `table`.
    ///
    /// Categories that fail to resolve contribute nothing, so the result may
    /// be empty.
    pub async fn resolve(&self, table: &CategoryTable) -> Vec<ResolvedEndpoint> {
        self.registry
            .fetch_all(table)
            .await
            .iter()
            .map(|record| build_endpoint(&self.analyzer_base, record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use crate::registry::{MockRegistry, RuleRegistry};
    use std::sync::Arc;

    fn base() -> Url {
        Url::parse("http://analyzer:9947").unwrap()
    }

    #[test]
    fn test_build_endpoint() {
        let endpoint = build_endpoint(&base(), &RuleRecord::new(Category::Sqli, "rule1"));

        assert_eq!(endpoint.url, "http://analyzer:9947/sqlis/rule1");
        assert_eq!(endpoint.category, Category::Sqli);
        assert_eq!(endpoint.rule_name, "rule1");
    }

    #[test]
    fn test_build_endpoint_encodes_rule_name() {
        let endpoint = build_endpoint(&base(), &RuleRecord::new(Category::Xss, "a b/c"));
        assert_eq!(endpoint.url, "http://analyzer:9947/xsss/a%20b%2Fc");
    }

    #[test]
    fn test_build_endpoint_keeps_base_path() {
        let base = Url::parse("https://gateway.internal:8443/analyzers/").unwrap();
        let endpoint = build_endpoint(&base, &RuleRecord::new(Category::FileUpload, "exe"));
        assert_eq!(endpoint.url, "https://gateway.internal:8443/analyzers/fus/exe");
    }

    #[tokio::test]
    async fn test_resolve_empty_registry() {
        let registry = Arc::new(MockRegistry::new());
        for category in Category::ALL {
            registry.create_collection(category.default_collection());
        }

        let resolver = EndpointResolver::new(
            RuleRegistryClient::new(registry as Arc<dyn RuleRegistry>, 10),
            base(),
        );

        assert!(resolver.resolve(&CategoryTable::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_is_deterministic() {
        let registry = Arc::new(MockRegistry::new());
        registry.add_rule("analyzer-xsss", "x1");
        registry.add_rule("analyzer-sqlis", "s1");

        let resolver = EndpointResolver::new(
            RuleRegistryClient::new(registry as Arc<dyn RuleRegistry>, 10),
            base(),
        );

        let table = CategoryTable::default();
        let first = resolver.resolve(&table).await;
        let second = resolver.resolve(&table).await;

        assert_eq!(first, second);
        let urls: Vec<&str> = first.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["http://analyzer:9947/sqlis/s1", "http://analyzer:9947/xsss/x1"]
        );
    }
}
