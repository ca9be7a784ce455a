use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::traits::RuleRegistry;

/// Phase of startup the gate is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessStage {
    Connectivity,
    Collections,
}

impl fmt::Display for ReadinessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessStage::Connectivity => write!(f, "registry connectivity"),
            ReadinessStage::Collections => write!(f, "rule collections"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReadinessError {
    #[error("gave up waiting for {stage} after {waited:?} (missing: {missing:?})")]
    TimedOut {
        stage: ReadinessStage,
        waited: Duration,
        missing: Vec<String>,
    },
}

/// Doubling poll interval capped at a maximum.
#[derive(Debug, Clone)]
struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            current: initial,
            max: max.max(initial),
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

/// Startup precondition: registry reachable and every collection present.
pub struct ReadinessGate {
    registry: Arc<dyn RuleRegistry>,
    collections: Vec<String>,
    initial_interval: Duration,
    max_interval: Duration,
    timeout: Option<Duration>,
}

impl ReadinessGate {
    pub fn new(registry: Arc<dyn RuleRegistry>, collections: Vec<String>) -> Self {
        ReadinessGate {
            registry,
            collections,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            timeout: None,
        }
    }

    /// Set the initial and maximum poll intervals.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial;
        self.max_interval = max;
        self
    }

    /// Give up after `timeout` in total. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Block until the registry is reachable and all collections exist.
    pub async fn await_ready(&self) -> Result<(), ReadinessError> {
        let started = Instant::now();
        let mut backoff = Backoff::new(self.initial_interval, self.max_interval);

        info!("Waiting for rule registry");
        while !self.registry.ping().await {
            self.pause(&mut backoff, started, ReadinessStage::Connectivity, Vec::new())
                .await?;
        }
        info!(waited_ms = started.elapsed().as_millis() as u64, "Rule registry reachable");

        let mut backoff = Backoff::new(self.initial_interval, self.max_interval);
        loop {
            let missing = self.missing_collections().await;
            if missing.is_empty() {
                break;
            }
            debug!(missing = ?missing, "Rule collections not ready");
            self.pause(&mut backoff, started, ReadinessStage::Collections, missing)
                .await?;
        }

        info!(
            collections = ?self.collections,
            waited_ms = started.elapsed().as_millis() as u64,
            "Rule collections ready"
        );
        Ok(())
    }

    async fn missing_collections(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for collection in &self.collections {
            match self.registry.exists(collection).await {
                Ok(true) => {}
                Ok(false) => missing.push(collection.clone()),
                Err(e) => {
                    debug!(collection = %collection, error = %e, "Collection check failed");
                    missing.push(collection.clone());
                }
            }
        }
        missing
    }

    async fn pause(
        &self,
        backoff: &mut Backoff,
        started: Instant,
        stage: ReadinessStage,
        missing: Vec<String>,
    ) -> Result<(), ReadinessError> {
        let mut delay = backoff.next_delay();

        if let Some(timeout) = self.timeout {
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ReadinessError::TimedOut {
                    stage,
                    waited,
                    missing,
                });
            }
            delay = delay.min(timeout - waited);
        }

        debug!(stage = %stage, delay_ms = delay.as_millis() as u64, "Registry not ready, retrying");
        sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MockRegistry;

    fn gate(registry: Arc<MockRegistry>, collections: &[&str]) -> ReadinessGate {
        ReadinessGate::new(
            registry as Arc<dyn RuleRegistry>,
            collections.iter().map(|c| c.to_string()).collect(),
        )
        .with_backoff(Duration::from_millis(100), Duration::from_millis(400))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_immediately() {
        let registry = Arc::new(MockRegistry::new());
        registry.create_collection("analyzer-sqlis");

        gate(registry.clone(), &["analyzer-sqlis"])
            .await_ready()
            .await
            .unwrap();

        assert_eq!(registry.ping_calls(), 1);
        assert_eq!(registry.exists_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_connectivity() {
        let registry = Arc::new(MockRegistry::new());
        registry.create_collection("analyzer-sqlis");
        registry.fail_next_pings(3);

        gate(registry.clone(), &["analyzer-sqlis"])
            .await_ready()
            .await
            .unwrap();

        assert_eq!(registry.ping_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_collections() {
        let registry = Arc::new(MockRegistry::new());
        registry.create_collection("analyzer-sqlis");

        let creator = {
            let registry = registry.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(1)).await;
                registry.create_collection("analyzer-xsss");
            })
        };

        gate(registry.clone(), &["analyzer-sqlis", "analyzer-xsss"])
            .await_ready()
            .await
            .unwrap();

        creator.await.unwrap();
        assert!(registry.exists_calls() > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_on_missing_collection() {
        let registry = Arc::new(MockRegistry::new());
        registry.create_collection("analyzer-sqlis");

        let result = gate(registry, &["analyzer-sqlis", "analyzer-fus"])
            .with_timeout(Some(Duration::from_secs(2)))
            .await_ready()
            .await;

        match result {
            Err(ReadinessError::TimedOut { stage, missing, .. }) => {
                assert_eq!(stage, ReadinessStage::Collections);
                assert_eq!(missing, vec!["analyzer-fus".to_string()]);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_unreachable() {
        let registry = Arc::new(MockRegistry::new());
        registry.set_reachable(false);

        let result = gate(registry.clone(), &["analyzer-sqlis"])
            .with_timeout(Some(Duration::from_secs(1)))
            .await_ready()
            .await;

        assert!(matches!(
            result,
            Err(ReadinessError::TimedOut {
                stage: ReadinessStage::Connectivity,
                ..
            })
        ));
        assert_eq!(registry.exists_calls(), 0);
    }
}
