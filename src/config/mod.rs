use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

/// How per-endpoint outcomes are reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeliveryPolicy {
    /// Every outcome is returned and drives the overall status
    Collect,
    /// Failures are logged and dropped; the caller always sees success
    FireAndContinue,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Errors raised while validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Forwarder configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "forwarder")]
#[command(about = "Rule-driven fan-out forwarder")]
pub struct Config {
    /// Rule registry (Elasticsearch) base URL
    #[arg(long, default_value = "http://elasticsearch:9200", env = "ES_HOST")]
    pub es_host: String,

    /// Rule registry username
    #[arg(long, default_value = "elastic", env = "ES_USER")]
    pub es_user: String,

    /// Rule registry password
    #[arg(long, default_value = "elastic", env = "ES_PASS", hide_env_values = true)]
    pub es_pass: String,

    /// Maximum rules fetched per category
    #[arg(long, default_value = "10000", env = "ES_MAX_RESULT")]
    pub es_max_result: u32,

    /// HTTP server listen host
    #[arg(long, default_value = "0.0.0.0", env = "BACKEND_HOST")]
    pub backend_host: String,

    /// HTTP server listen port
    #[arg(long, default_value = "9946", env = "BACKEND_PORT")]
    pub backend_port: u16,

    /// Analyzer URL scheme
    #[arg(long, default_value = "http", env = "ANALYZER_SCHEME")]
    pub analyzer_scheme: String,

    /// Analyzer host
    #[arg(long, default_value = "analyzer", env = "ANALYZER_HOST")]
    pub analyzer_host: String,

    /// Analyzer port
    #[arg(long, default_value = "9947", env = "ANALYZER_PORT")]
    pub analyzer_port: u16,

    /// Timeout for each registry call in milliseconds
    #[arg(long, default_value = "5000", env = "REGISTRY_TIMEOUT_MS")]
    pub registry_timeout_ms: u64,

    /// Timeout for each analyzer delivery in milliseconds
    #[arg(long, default_value = "10000", env = "DELIVERY_TIMEOUT_MS")]
    pub delivery_timeout_ms: u64,

    /// Overall deadline for one fan-out in milliseconds (unset waits for every delivery)
    #[arg(long, env = "REQUEST_DEADLINE_MS")]
    pub request_deadline_ms: Option<u64>,

    /// Maximum deliveries in flight per request
    #[arg(long, default_value = "32", env = "MAX_CONCURRENCY")]
    pub max_concurrency: usize,

    /// Maximum analyzer response body captured per outcome
    #[arg(long, default_value = "65536", env = "MAX_RESPONSE_BODY_BYTES")]
    pub max_body_bytes: usize,

    /// Maximum inbound request body accepted
    #[arg(long, default_value = "16777216", env = "MAX_REQUEST_BODY_BYTES")]
    pub max_request_bytes: usize,

    /// Delivery reporting policy
    #[arg(long, value_enum, default_value = "collect", env = "DELIVERY_POLICY")]
    pub delivery_policy: DeliveryPolicy,

    /// Initial readiness poll interval in milliseconds
    #[arg(long, default_value = "500", env = "READY_INTERVAL_MS")]
    pub ready_interval_ms: u64,

    /// Maximum readiness poll interval in milliseconds
    #[arg(long, default_value = "10000", env = "READY_MAX_INTERVAL_MS")]
    pub ready_max_interval_ms: u64,

    /// Give up waiting for the registry after this many seconds (unset waits forever)
    #[arg(long, env = "READY_TIMEOUT_SECS")]
    pub ready_timeout_secs: Option<u64>,

    /// YAML file overriding the category to collection table
    #[arg(long, env = "CATEGORIES_FILE")]
    pub categories_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,
}

impl Config {
    /// Check invariants that clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.es_host.trim().is_empty() {
            return invalid("ES_HOST cannot be empty");
        }
        if let Err(e) = reqwest::Url::parse(&self.es_host) {
            return Err(ConfigError::Invalid(format!(
                "ES_HOST '{}' is not a valid URL: {}",
                self.es_host, e
            )));
        }
        if self.analyzer_host.trim().is_empty() {
            return invalid("ANALYZER_HOST cannot be empty");
        }
        if !matches!(self.analyzer_scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "ANALYZER_SCHEME must be http or https, got '{}'",
                self.analyzer_scheme
            )));
        }
        if self.analyzer_port == 0 || self.backend_port == 0 {
            return invalid("ports must be non-zero");
        }
        if let Err(e) = reqwest::Url::parse(&self.analyzer_base_url()) {
            return Err(ConfigError::Invalid(format!(
                "analyzer address '{}' is not a valid URL: {}",
                self.analyzer_base_url(),
                e
            )));
        }
        if self.es_max_result == 0 {
            return invalid("ES_MAX_RESULT must be positive");
        }
        if self.max_request_bytes == 0 {
            return invalid("MAX_REQUEST_BODY_BYTES must be positive");
        }
        if self.max_concurrency == 0 {
            return invalid("MAX_CONCURRENCY must be positive");
        }
        if self.registry_timeout_ms == 0 || self.delivery_timeout_ms == 0 {
            return invalid("timeouts must be non-zero");
        }
        if self.request_deadline_ms == Some(0) {
            return invalid("REQUEST_DEADLINE_MS must be positive when set");
        }
        if self.ready_interval_ms == 0 || self.ready_max_interval_ms < self.ready_interval_ms {
            return invalid("READY_MAX_INTERVAL_MS must be at least READY_INTERVAL_MS (> 0)");
        }

        Ok(())
    }

    /// Listen address for the HTTP server.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }

    /// Analyzer base URL without trailing slash.
    pub fn analyzer_base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.analyzer_scheme, self.analyzer_host, self.analyzer_port
        )
    }

    /// Password with every character masked, for startup logs.
    pub fn masked_password(&self) -> String {
        "*".repeat(self.es_pass.chars().count())
    }

    /// Get registry call timeout as Duration.
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    /// Get per-delivery timeout as Duration.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Get fan-out deadline as Duration.
    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_ms.map(Duration::from_millis)
    }

    /// Get initial readiness poll interval as Duration.
    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    /// Get maximum readiness poll interval as Duration.
    pub fn ready_max_interval(&self) -> Duration {
        Duration::from_millis(self.ready_max_interval_ms)
    }

    /// Get readiness timeout as Duration.
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            es_host: "http://elasticsearch:9200".to_string(),
            es_user: "elastic".to_string(),
            es_pass: "elastic".to_string(),
            es_max_result: 10_000,
            backend_host: "0.0.0.0".to_string(),
            backend_port: 9946,
            analyzer_scheme: "http".to_string(),
            analyzer_host: "analyzer".to_string(),
            analyzer_port: 9947,
            registry_timeout_ms: 5000,
            delivery_timeout_ms: 10_000,
            request_deadline_ms: None,
            max_concurrency: 32,
            max_body_bytes: 64 * 1024,
            max_request_bytes: 16 * 1024 * 1024,
            delivery_policy: DeliveryPolicy::Collect,
            ready_interval_ms: 500,
            ready_max_interval_ms: 10_000,
            ready_timeout_secs: None,
            categories_file: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            graceful_shutdown: true,
        }
    }
}
