//! Pulse server binary: webhook relay and fragmented log publisher.
//!
//! Starts an axum HTTP server with structured logging and graceful shutdown
//! on SIGTERM/SIGINT.

use pulse_auth::{TokenCache, UmaAuthorizer};
use pulse_bus::EventBus;
use pulse_log::{
    BackgroundTasks, LdpLogStore, LogPublisher, PublisherConfig, TreePathExtractor,
};
use pulse_server::api::EmptyGateway;
use pulse_server::config::{self, Config};
use pulse_server::pipeline::{self, PassthroughAggregator};
use pulse_server::relay::Relay;
use pulse_server::{app, AppState};
use pulse_types::Credential;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PULSE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Starts the log pipeline when it is enabled and a log root is configured.
fn start_pipeline(config: &Config, client: &reqwest::Client, bus: &EventBus) {
    if !config.pipeline.enabled {
        return;
    }
    let Some(root) = config.log.root.clone() else {
        tracing::warn!("pipeline enabled without log.root, not starting");
        return;
    };

    let publisher = Arc::new(LogPublisher::new(
        Arc::new(LdpLogStore::new(client.clone())),
        BackgroundTasks::start(),
        PublisherConfig {
            root,
            tree_path: config.log.tree_path.clone(),
            pointer_update: config.log.pointer_update,
        },
    ));
    let aggregator = Arc::new(PassthroughAggregator::new(
        Box::new(TreePathExtractor::new(config.log.tree_path.clone())),
        config.pipeline.query.clone(),
    ));

    let handles = pipeline::spawn(bus, &config.pipeline.topics, aggregator, publisher);
    tracing::info!(topics = handles.len(), "log pipeline started");
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration: the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.relay.fetch_timeout_secs))
        .build()
        .expect("failed to build HTTP client");

    // Credential cache, seeded from config
    let authorizer = Arc::new(UmaAuthorizer::new(
        client.clone(),
        config.authorization.client_id.clone(),
        config.authorization.claim_format.clone(),
    ));
    let cache = Arc::new(TokenCache::new(authorizer));
    for seeded in &config.credentials {
        cache.insert(Credential::new(
            seeded.scope.clone(),
            seeded.token_type.clone(),
            seeded.access_token.clone(),
        ));
    }
    if !cache.is_empty() {
        tracing::info!(count = cache.len(), "seeded credentials");
    }

    let bus = EventBus::new();
    start_pipeline(&config, &client, &bus);

    // Build application
    let state = AppState {
        relay: Relay::new(cache, bus, client, &config.relay),
        gateway: Arc::new(EmptyGateway),
    };
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting pulse server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address: is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("pulse server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
