//! Courseware Cache server
//!
//! Serves the cache administration, invalidation and rate-limited AI
//! endpoints over one shared store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courseware_cache::api::create_router;
use courseware_cache::cache::{KvBackend, MemoryBackend};
use courseware_cache::provider::LocalProvider;
use courseware_cache::{spawn_cleanup_task, AppState, Config};

/// # Startup Sequence
/// 1. Initialize tracing subscriber
/// 2. Load configuration from environment variables
/// 3. Connect the store backend (shared store or in-process)
/// 4. Start the expiry sweep for the in-process backend
/// 5. Serve the router until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courseware_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Courseware Cache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, default_ttl={}s, store_timeout={}ms, single_flight={}, failure_policy={:?}",
        config.server_port,
        config.default_ttl,
        config.store_timeout_ms,
        config.single_flight,
        config.rate_limit_failure_policy
    );

    let (backend, cleanup_handle) = connect_backend(&config).await?;
    let state = AppState::new(backend, &config, Arc::new(LocalProvider));
    info!("Store backend ready: {}", state.store.backend_name());

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cleanup_handle))
    .await
    .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(feature = "redis")]
async fn connect_backend(
    config: &Config,
) -> anyhow::Result<(Arc<dyn KvBackend>, Option<JoinHandle<()>>)> {
    if let Some(url) = &config.redis_url {
        let backend = courseware_cache::cache::RedisBackend::connect(url)
            .await
            .context("failed to connect to shared store")?;
        let backend: Arc<dyn KvBackend> = Arc::new(backend);
        return Ok((backend, None));
    }
    Ok(memory_backend(config))
}

#[cfg(not(feature = "redis"))]
async fn connect_backend(
    config: &Config,
) -> anyhow::Result<(Arc<dyn KvBackend>, Option<JoinHandle<()>>)> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the redis feature is disabled; using in-process store");
    }
    Ok(memory_backend(config))
}

fn memory_backend(config: &Config) -> (Arc<dyn KvBackend>, Option<JoinHandle<()>>) {
    let backend = Arc::new(MemoryBackend::new(config.max_entries));
    let handle = spawn_cleanup_task(backend.clone(), config.cleanup_interval);
    info!("Expiry sweep started");
    (backend as Arc<dyn KvBackend>, Some(handle))
}

/// Waits for Ctrl+C or SIGTERM, then stops the expiry sweep.
async fn shutdown_signal(cleanup_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Expiry sweep aborted");
    }
}
