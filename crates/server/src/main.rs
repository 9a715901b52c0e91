use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genbroker_core::{
    create_notification_system, load_config, validate_config, ArtifactFetcher, ArtifactPipeline,
    FsObjectStore, HttpFetcher, LogNotifier, Notifier, ObjectStore, OrchestratorContext,
    ProviderRegistry, SqliteTaskStore, TaskOrchestrator, TaskStore, WebhookNotifier,
};

use genbroker_server::api::create_router;
use genbroker_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming the config file
const CONFIG_ENV: &str = "GENBROKER_CONFIG";

/// How long to wait for queued notifications on shutdown
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("genbroker {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Create SQLite task store
    let task_store: Arc<dyn TaskStore> = Arc::new(
        SqliteTaskStore::new(&config.database.path).context("Failed to create task store")?,
    );
    info!("Task store initialized");

    // Create providers, one per task type
    let providers = ProviderRegistry::from_configs(&config.providers)
        .context("Failed to create generation providers")?;
    if providers.is_empty() {
        warn!("No providers configured, every submission will be rejected");
    } else {
        info!("Registered task types: {}", providers.task_types().join(", "));
    }

    // Create artifact pipeline
    let object_store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(config.storage.clone()));
    info!("Object store rooted at {:?}", config.storage.root);
    let fetcher: Arc<dyn ArtifactFetcher> = Arc::new(
        HttpFetcher::new(&config.artifact).context("Failed to create artifact fetcher")?,
    );
    let pipeline = Arc::new(ArtifactPipeline::new(
        config.artifact.clone(),
        fetcher,
        Arc::clone(&object_store),
    ));

    // Create notification system
    let notifier: Arc<dyn Notifier> = if config.notifier.enabled {
        info!("Notifications posted to webhook");
        Arc::new(WebhookNotifier::new(&config.notifier).context("Failed to create notifier")?)
    } else {
        info!("Webhook notifier disabled, notifications are logged only");
        Arc::new(LogNotifier)
    };
    let (notification_handle, dispatcher) =
        create_notification_system(notifier, &config.notifier);

    // Spawn dispatcher task
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    // Create orchestrator
    let context = Arc::new(OrchestratorContext::new(
        Arc::clone(&task_store),
        providers,
        pipeline,
        notification_handle,
        config.orchestrator.clone(),
    ));
    let orchestrator = Arc::new(TaskOrchestrator::new(context));

    if config.orchestrator.enabled {
        orchestrator.start().await;
        info!("Task orchestrator {} started", orchestrator.instance_id());
    } else {
        info!("Orchestrator disabled in config");
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&orchestrator),
        task_store,
        object_store,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    if orchestrator.is_running() {
        info!("Stopping orchestrator...");
        orchestrator.stop().await;
        info!("Orchestrator stopped");
    }

    // The dispatcher exits once every NotificationHandle is gone; the
    // orchestrator context holds the last one.
    drop(orchestrator);
    match tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, dispatcher_handle).await {
        Ok(_) => info!("Notification dispatcher stopped"),
        Err(_) => warn!("Notification dispatcher did not drain in time"),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
