//! Concurrent delivery of one payload to many analyzer endpoints.
//!
//! Every endpoint gets its own spawned task, bounded by a semaphore so at
//! most `max_concurrency` requests are in flight per dispatch. Outcomes are
//! written into slots indexed by resolution order, so the returned sequence
//! is deterministic no matter which delivery finishes first.
//!
//! A failing endpoint (timeout, refused connection, non-2xx) only affects its
//! own outcome. When a fan-out deadline is configured and elapses, the join
//! stops waiting; tasks still running are detached and finish on their own
//! per-endpoint timeout, with their results discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::domain::{DeliveryError, DeliveryOutcome, ResolvedEndpoint};

/// Fan-out tuning.
#[derive(Debug, Clone)]
pub struct FanOutConfig {
    /// Timeout for a single delivery, including reading the response body
    pub delivery_timeout: Duration,
    /// Overall bound on one fan-out. `None` waits for every delivery.
    pub deadline: Option<Duration>,
    /// Maximum deliveries in flight per dispatch
    pub max_concurrency: usize,
    /// Response body bytes kept per outcome
    pub max_body_bytes: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        FanOutConfig {
            delivery_timeout: Duration::from_secs(10),
            deadline: None,
            max_concurrency: 32,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Raw fan-out result before aggregation.
#[derive(Debug, Clone, Default)]
pub struct FanOut {
    /// Completed outcomes in resolution order
    pub outcomes: Vec<DeliveryOutcome>,
    /// Deliveries abandoned at the deadline
    pub abandoned: usize,
}

/// Delivers payloads to resolved endpoints.
///
/// Cheap to clone; the reqwest client is shared process-wide.
#[derive(Clone)]
pub struct FanOutDispatcher {
    client: Client,
    config: FanOutConfig,
}

impl FanOutDispatcher {
    pub fn new(config: FanOutConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.delivery_timeout)
            .pool_max_idle_per_host(config.max_concurrency)
            .tcp_nodelay(true)
            .build()?;

        Ok(FanOutDispatcher { client, config })
    }

    /// Send `payload` to every endpoint and collect one outcome per endpoint,
    /// bounded by the configured deadline.
    pub async fn dispatch(&self, payload: Bytes, endpoints: Vec<ResolvedEndpoint>) -> FanOut {
        self.dispatch_within(payload, endpoints, self.config.deadline)
            .await
    }

    /// Like `dispatch`, with an explicit deadline. `None` waits for every
    /// delivery to finish.
    pub async fn dispatch_within(
        &self,
        payload: Bytes,
        endpoints: Vec<ResolvedEndpoint>,
        deadline: Option<Duration>,
    ) -> FanOut {
        let total = endpoints.len();
        if total == 0 {
            return FanOut::default();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut pending: FuturesUnordered<_> = endpoints
            .into_iter()
            .enumerate()
            .map(|(idx, endpoint)| {
                let this = self.clone();
                let payload = payload.clone();
                let semaphore = semaphore.clone();
                let fallback = endpoint.clone();

                let handle = tokio::spawn(async move {
                    // The semaphore is never closed, so acquire only fails if it is.
                    let _permit = semaphore.acquire_owned().await.ok();
                    this.deliver(endpoint, payload).await
                });

                async move {
                    let outcome = match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => DeliveryOutcome::failed(
                            fallback,
                            DeliveryError::Request {
                                message: format!("delivery task failed: {}", e),
                            },
                            0,
                        ),
                    };
                    (idx, outcome)
                }
            })
            .collect();

        let mut slots: Vec<Option<DeliveryOutcome>> = (0..total).map(|_| None).collect();

        let join = async {
            while let Some((idx, outcome)) = pending.next().await {
                slots[idx] = Some(outcome);
            }
        };

        match deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, join).await.is_err() {
                    warn!(
                        deadline_ms = deadline.as_millis() as u64,
                        "Fan-out deadline elapsed, abandoning outstanding deliveries"
                    );
                }
            }
            None => join.await,
        }
        // Dropping the remaining JoinHandles detaches their tasks.
        drop(pending);

        let outcomes: Vec<DeliveryOutcome> = slots.into_iter().flatten().collect();
        let abandoned = total - outcomes.len();

        FanOut {
            outcomes,
            abandoned,
        }
    }

    /// Deliver to a single endpoint. Never fails; errors become outcomes.
    pub async fn deliver(&self, endpoint: ResolvedEndpoint, payload: Bytes) -> DeliveryOutcome {
        let start = Instant::now();

        let result = self
            .client
            .post(&endpoint.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .timeout(self.config.delivery_timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let error = self.classify(e);
                warn!(url = %endpoint.url, error = %error, "Failed to send payload");
                return DeliveryOutcome::failed(endpoint, error, elapsed_ms(start));
            }
        };

        let status = response.status();
        let body = match self.read_body(response).await {
            Ok(body) => body,
            Err(e) => {
                let error = self.classify(e);
                warn!(url = %endpoint.url, error = %error, "Failed to read analyzer response");
                return DeliveryOutcome::failed(endpoint, error, elapsed_ms(start));
            }
        };

        if status.is_success() {
            debug!(url = %endpoint.url, status = status.as_u16(), "Payload delivered");
            DeliveryOutcome::delivered(endpoint, status.as_u16(), body, elapsed_ms(start))
        } else {
            warn!(
                url = %endpoint.url,
                status = status.as_u16(),
                "Analyzer rejected payload"
            );
            DeliveryOutcome::failed(
                endpoint,
                DeliveryError::Status {
                    code: status.as_u16(),
                    body,
                },
                elapsed_ms(start),
            )
        }
    }

    /// Read at most `max_body_bytes`, as JSON when the whole body parses.
    async fn read_body(&self, mut response: Response) -> Result<serde_json::Value, reqwest::Error> {
        let limit = self.config.max_body_bytes;
        let mut buf: Vec<u8> = Vec::new();
        let mut truncated = false;

        while let Some(chunk) = response.chunk().await? {
            let room = limit - buf.len();
            if chunk.len() > room {
                buf.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(body_value(&buf, truncated))
    }

    fn classify(&self, e: reqwest::Error) -> DeliveryError {
        if e.is_timeout() {
            DeliveryError::Timeout {
                after_ms: self.config.delivery_timeout.as_millis() as u64,
            }
        } else if e.is_connect() {
            DeliveryError::Connect {
                message: e.to_string(),
            }
        } else {
            DeliveryError::Request {
                message: e.to_string(),
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn body_value(buf: &[u8], truncated: bool) -> serde_json::Value {
    if buf.is_empty() {
        return serde_json::Value::Null;
    }
    if !truncated {
        if let Ok(value) = serde_json::from_slice(buf) {
            return value;
        }
    }
    serde_json::Value::String(String::from_utf8_lossy(buf).into_owned())
}
