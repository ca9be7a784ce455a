//! Rule registry backed by the Elasticsearch REST API.
//!
//! Only three calls are used:
//! - `HEAD /` for connectivity
//! - `HEAD /{index}` for collection existence
//! - `POST /{index}/_search` with a `match_all` query bounded by `size`
//!
//! No retries are performed here; callers decide what a failure means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::traits::{RegistryError, RuleHit, RuleRegistry};

/// Elasticsearch's default `index.max_result_window`. A larger `size` is
/// rejected with a 400, so requests are capped here.
pub const MAX_RESULT_WINDOW: u32 = 10_000;

/// Connection settings for the Elasticsearch registry.
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Base URL, e.g. "http://elasticsearch:9200"
    pub base_url: String,
    /// Basic auth username (empty disables auth)
    pub username: String,
    pub password: String,
    /// Per-call timeout
    pub timeout: Duration,
}

impl ElasticsearchConfig {
    /// Create a config with the given base URL and no credentials.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        ElasticsearchConfig {
            base_url: base_url.into(),
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_source", default)]
    source: serde_json::Value,
}

/// Elasticsearch-backed rule registry.
///
/// Cheap to clone; the underlying reqwest client pools connections.
#[derive(Clone)]
pub struct ElasticsearchRegistry {
    client: Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchRegistry {
    /// Build a registry client, validating the base URL.
    pub fn new(config: ElasticsearchConfig) -> Result<Self, RegistryError> {
        if let Err(e) = reqwest::Url::parse(&config.base_url) {
            return Err(RegistryError::Unreachable(format!(
                "invalid base url '{}': {}",
                config.base_url, e
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RegistryError::Unreachable(format!("client build error: {}", e)))?;

        Ok(ElasticsearchRegistry { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.config.username, Some(&self.config.password))
        }
    }
}

#[async_trait]
impl RuleRegistry for ElasticsearchRegistry {
    async fn search(&self, collection: &str, limit: u32) -> Result<Vec<RuleHit>, RegistryError> {
        let size = limit.min(MAX_RESULT_WINDOW);
        let body = json!({
            "query": { "match_all": {} },
            "size": size,
        });

        let response = self
            .authorize(self.client.post(self.url(&format!("{}/_search", collection))))
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(RegistryError::CollectionNotFound(collection.to_string()))
            }
            s => {
                return Err(RegistryError::Status {
                    collection: collection.to_string(),
                    status: s.as_u16(),
                })
            }
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;

        let mut hits = Vec::with_capacity(parsed.hits.hits.len());
        for hit in parsed.hits.hits {
            match hit.source.get("rule_name").and_then(|v| v.as_str()) {
                Some(name) if !name.is_empty() => hits.push(RuleHit::new(name)),
                _ => warn!(
                    collection = collection,
                    id = hit.id.as_deref().unwrap_or("?"),
                    "Skipping rule document without rule_name"
                ),
            }
        }

        debug!(collection = collection, hits = hits.len(), "Registry search completed");
        Ok(hits)
    }

    async fn exists(&self, collection: &str) -> Result<bool, RegistryError> {
        let response = self
            .authorize(self.client.head(self.url(collection)))
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(RegistryError::Status {
                collection: collection.to_string(),
                status: s.as_u16(),
            }),
        }
    }

    async fn ping(&self) -> bool {
        match self
            .authorize(self.client.head(&self.config.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Registry ping failed");
                false
            }
        }
    }
}
