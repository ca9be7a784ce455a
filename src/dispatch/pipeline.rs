use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DeliveryPolicy;
use crate::domain::{CategoryTable, DispatchResult, Payload};
use crate::observability::{MetricsRegistry, TimingGuard};
use crate::registry::RuleRegistryClient;

use super::aggregator::{aggregate, apply_policy};
use super::error::DispatchError;
use super::fanout::FanOutDispatcher;
use super::resolver::EndpointResolver;

/// One dispatch cycle per inbound request: validate, check the registry,
/// resolve endpoints, fan out, aggregate.
pub struct Forwarder {
    registry: RuleRegistryClient,
    resolver: EndpointResolver,
    dispatcher: FanOutDispatcher,
    table: CategoryTable,
    policy: DeliveryPolicy,
    metrics: Arc<MetricsRegistry>,
}

impl Forwarder {
    pub fn new(
        registry: RuleRegistryClient,
        resolver: EndpointResolver,
        dispatcher: FanOutDispatcher,
        table: CategoryTable,
        policy: DeliveryPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Forwarder {
            registry,
            resolver,
            dispatcher,
            table,
            policy,
            metrics,
        }
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    /// Forward a raw request body to every enabled rule's analyzer.
    pub async fn forward(&self, body: Bytes) -> Result<DispatchResult, DispatchError> {
        let _timing = TimingGuard::new(&self.metrics);

        let result = self.run(body).await;
        match &result {
            Ok(dispatch) => self.metrics.record_dispatch(dispatch),
            Err(e) => self.metrics.record_error(e),
        }

        result.map(|dispatch| apply_policy(dispatch, self.policy))
    }

    async fn run(&self, body: Bytes) -> Result<DispatchResult, DispatchError> {
        let payload = Payload::from_json_bytes(body).map_err(|e| {
            warn!(error = %e, "Rejecting invalid payload");
            DispatchError::from(e)
        })?;

        if !self.registry.ping().await {
            warn!("Rule registry unreachable, refusing to dispatch");
            return Err(DispatchError::RegistryUnavailable);
        }

        let endpoints = self.resolver.resolve(&self.table).await;
        if endpoints.is_empty() {
            warn!("No enabled rules found");
            return Err(DispatchError::NoEnabledRules);
        }

        let dispatch_id = Uuid::new_v4();
        let endpoint_count = endpoints.len();
        let fan_out = match self.policy {
            DeliveryPolicy::Collect => self.dispatcher.dispatch(payload.bytes(), endpoints).await,
            // Success is only reported once every attempt has finished.
            DeliveryPolicy::FireAndContinue => {
                self.dispatcher
                    .dispatch_within(payload.bytes(), endpoints, None)
                    .await
            }
        };
        let result = aggregate(dispatch_id, fan_out);

        info!(
            dispatch_id = %dispatch_id,
            endpoints = endpoint_count,
            delivered = result.delivered_count(),
            failed = result.failed_count(),
            abandoned = result.abandoned,
            status = %result.overall_status,
            "Dispatch completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::FanOutConfig;
    use crate::domain::{Category, DeliveryError, DeliveryStatus, OverallStatus};
    use crate::observability::tracing::init_test_tracing;
    use crate::registry::{MockRegistry, RuleRegistry};
    use reqwest::Url;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forwarder(
        registry: Arc<MockRegistry>,
        analyzer: &str,
        table: CategoryTable,
        policy: DeliveryPolicy,
    ) -> (Forwarder, Arc<MetricsRegistry>) {
        init_test_tracing();

        let client = RuleRegistryClient::new(registry as Arc<dyn RuleRegistry>, 100);
        let resolver = EndpointResolver::new(client.clone(), Url::parse(analyzer).unwrap());
        let dispatcher = FanOutDispatcher::new(FanOutConfig {
            delivery_timeout: Duration::from_millis(300),
            ..FanOutConfig::default()
        })
        .unwrap();
        let metrics = Arc::new(MetricsRegistry::new());

        let forwarder = Forwarder::new(client, resolver, dispatcher, table, policy, metrics.clone());
        (forwarder, metrics)
    }

    fn sqlis_only() -> CategoryTable {
        CategoryTable::new([(Category::Sqli, "analyzer-sqlis")])
    }

    #[tokio::test]
    async fn test_single_rule_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sqlis/rule1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let registry = Arc::new(MockRegistry::new());
        registry.add_rule("analyzer-sqlis", "rule1");

        let (forwarder, metrics) =
            forwarder(registry, &server.uri(), sqlis_only(), DeliveryPolicy::Collect);

        let result = forwarder.forward(Bytes::from(r#"{"x":1}"#)).await.unwrap();

        assert_eq!(result.overall_status, OverallStatus::Success);
        assert_eq!(result.outcomes.len(), 1);
        assert!(result.outcomes[0].endpoint.url.ends_with("/sqlis/rule1"));
        assert!(matches!(
            result.outcomes[0].status,
            DeliveryStatus::Delivered { code: 200, .. }
        ));
        assert_eq!(metrics.requests_success.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_timeout_and_success_is_partial_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sqlis/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sqlis/fast"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let registry = Arc::new(MockRegistry::new());
        registry.add_rule("analyzer-sqlis", "slow");
        registry.add_rule("analyzer-sqlis", "fast");

        let (forwarder, _) =
            forwarder(registry, &server.uri(), sqlis_only(), DeliveryPolicy::Collect);

        let result = forwarder.forward(Bytes::from("{}")).await.unwrap();

        assert_eq!(result.overall_status, OverallStatus::PartialFailure);
        assert_eq!(result.outcomes.len(), 2);
        assert!(matches!(
            result.outcomes[0].status,
            DeliveryStatus::Failed {
                error: DeliveryError::Timeout { .. }
            }
        ));
        assert!(result.outcomes[1].is_delivered());
    }

    #[tokio::test]
    async fn test_invalid_payload_skips_registry() {
        let registry = Arc::new(MockRegistry::new());
        registry.add_rule("analyzer-sqlis", "rule1");

        let (forwarder, metrics) = forwarder(
            registry.clone(),
            "http://127.0.0.1:1",
            sqlis_only(),
            DeliveryPolicy::Collect,
        );

        let result = forwarder.forward(Bytes::from("not json")).await;

        assert!(matches!(result, Err(DispatchError::InvalidPayload(_))));
        assert_eq!(registry.ping_calls(), 0);
        assert_eq!(registry.search_calls(), 0);
        assert_eq!(metrics.requests_invalid_payload.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_registry_unavailable_makes_no_deliveries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let registry = Arc::new(MockRegistry::new());
        registry.add_rule("analyzer-sqlis", "rule1");
        registry.set_reachable(false);

        let (forwarder, _) =
            forwarder(registry.clone(), &server.uri(), sqlis_only(), DeliveryPolicy::Collect);

        let result = forwarder.forward(Bytes::from("{}")).await;

        assert_eq!(result.unwrap_err(), DispatchError::RegistryUnavailable);
        assert_eq!(registry.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_enabled_rules() {
        let registry = Arc::new(MockRegistry::new());
        for category in Category::ALL {
            registry.create_collection(category.default_collection());
        }

        let (forwarder, _) = forwarder(
            registry,
            "http://127.0.0.1:1",
            CategoryTable::default(),
            DeliveryPolicy::Collect,
        );

        let result = forwarder.forward(Bytes::from("{}")).await;
        assert_eq!(result.unwrap_err(), DispatchError::NoEnabledRules);
    }

    #[tokio::test]
    async fn test_fire_and_continue_hides_failures() {
        let registry = Arc::new(MockRegistry::new());
        registry.add_rule("analyzer-sqlis", "rule1");

        let (forwarder, metrics) = forwarder(
            registry,
            "http://127.0.0.1:1",
            sqlis_only(),
            DeliveryPolicy::FireAndContinue,
        );

        let result = forwarder.forward(Bytes::from("{}")).await.unwrap();

        assert_eq!(result.overall_status, OverallStatus::Success);
        assert!(result.outcomes.is_empty());
        // Metrics still see the real outcome.
        assert_eq!(metrics.requests_failure.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deliveries_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fire_and_continue_waits_past_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sqlis/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let registry = Arc::new(MockRegistry::new());
        registry.add_rule("analyzer-sqlis", "slow");

        let client = RuleRegistryClient::new(registry as Arc<dyn RuleRegistry>, 100);
        let resolver = EndpointResolver::new(client.clone(), Url::parse(&server.uri()).unwrap());
        let dispatcher = FanOutDispatcher::new(FanOutConfig {
            delivery_timeout: Duration::from_secs(2),
            deadline: Some(Duration::from_millis(50)),
            ..FanOutConfig::default()
        })
        .unwrap();
        let metrics = Arc::new(MetricsRegistry::new());
        let forwarder = Forwarder::new(
            client,
            resolver,
            dispatcher,
            sqlis_only(),
            DeliveryPolicy::FireAndContinue,
            metrics.clone(),
        );

        let result = forwarder.forward(Bytes::from("{}")).await.unwrap();

        assert_eq!(result.overall_status, OverallStatus::Success);
        assert_eq!(metrics.deliveries_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deliveries_abandoned.load(Ordering::Relaxed), 0);
    }
}
