use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use reqwest::Url;
use tokio::signal;
use tracing::{info, warn};

use forwarder::api::routes::{create_router, AppState};
use forwarder::config::Config;
use forwarder::dispatch::{EndpointResolver, FanOutConfig, FanOutDispatcher, Forwarder};
use forwarder::domain::CategoryTable;
use forwarder::observability::{init_tracing, MetricsRegistry};
use forwarder::registry::elasticsearch::MAX_RESULT_WINDOW;
use forwarder::registry::{
    ElasticsearchConfig, ElasticsearchRegistry, ReadinessGate, RuleRegistry, RuleRegistryClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting forwarder"
    );
    info!(
        es_host = %config.es_host,
        es_user = %config.es_user,
        es_pass = %config.masked_password(),
        es_max_result = config.es_max_result,
        listen_addr = %config.listen_addr(),
        analyzer = %config.analyzer_base_url(),
        delivery_policy = ?config.delivery_policy,
        delivery_timeout_ms = config.delivery_timeout_ms,
        request_deadline_ms = ?config.request_deadline_ms,
        max_concurrency = config.max_concurrency,
        max_request_bytes = config.max_request_bytes,
        "Effective configuration"
    );

    if config.es_max_result > MAX_RESULT_WINDOW {
        warn!(
            es_max_result = config.es_max_result,
            cap = MAX_RESULT_WINDOW,
            "ES_MAX_RESULT exceeds the registry result window, searches are capped"
        );
    }

    // Category table
    let table = match config.categories_file {
        Some(ref path) => CategoryTable::load(path)
            .with_context(|| format!("loading categories from {}", path.display()))?,
        None => CategoryTable::default(),
    };
    for (category, collection) in table.iter() {
        info!(category = %category, collection = collection, "Category enabled");
    }

    // Rule registry
    let registry: Arc<dyn RuleRegistry> = Arc::new(ElasticsearchRegistry::new(ElasticsearchConfig {
        base_url: config.es_host.clone(),
        username: config.es_user.clone(),
        password: config.es_pass.clone(),
        timeout: config.registry_timeout(),
    })?);

    // Block until the registry and every rule collection exist
    let gate = ReadinessGate::new(
        registry.clone(),
        table.collections().into_iter().map(String::from).collect(),
    )
    .with_backoff(config.ready_interval(), config.ready_max_interval())
    .with_timeout(config.ready_timeout());

    tokio::select! {
        ready = gate.await_ready() => ready?,
        _ = shutdown_signal() => {
            warn!("Shutdown requested before registry became ready");
            return Ok(());
        }
    }

    // Dispatch pipeline
    let registry_client = RuleRegistryClient::new(registry, config.es_max_result);
    let analyzer_base = Url::parse(&config.analyzer_base_url())
        .with_context(|| format!("invalid analyzer address {}", config.analyzer_base_url()))?;
    let resolver = EndpointResolver::new(registry_client.clone(), analyzer_base);
    let dispatcher = FanOutDispatcher::new(FanOutConfig {
        delivery_timeout: config.delivery_timeout(),
        deadline: config.request_deadline(),
        max_concurrency: config.max_concurrency,
        max_body_bytes: config.max_body_bytes,
    })?;
    let metrics = Arc::new(MetricsRegistry::new());

    let forwarder = Forwarder::new(
        registry_client.clone(),
        resolver,
        dispatcher,
        table,
        config.delivery_policy,
        metrics.clone(),
    );

    // Create application state
    let state = Arc::new(AppState {
        forwarder: Arc::new(forwarder),
        registry: registry_client,
        metrics,
        max_request_bytes: config.max_request_bytes,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    // Create router
    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr().parse()?;

    info!(addr = %addr, "Starting HTTP server");

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
