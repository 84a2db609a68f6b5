use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parrot_api::config::ServerConfig;
use parrot_api::router::build_app_router;
use parrot_api::state::AppState;
use parrot_engine::blob::FsBlobStore;
use parrot_engine::executor::{ExecutorConfig, StageExecutor};
use parrot_engine::inspect::WavInspector;
use parrot_engine::registry::JobRegistry;
use parrot_engine::remote::RemoteEngine;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parrot_api=debug,parrot_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = parrot_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    parrot_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    parrot_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Collaborators ---
    let blobs = Arc::new(FsBlobStore::new(&config.data_dir));
    let inspector = Arc::new(WavInspector);
    let engine = Arc::new(
        RemoteEngine::new(config.engine_url.clone()).expect("Failed to build engine client"),
    );
    tracing::info!(engine_url = %config.engine_url, data_dir = %config.data_dir, "Collaborators wired");

    // --- Registry and executor ---
    let registry = JobRegistry::new(pool.clone());
    let executor = StageExecutor::new(
        registry.clone(),
        engine,
        blobs.clone(),
        ExecutorConfig {
            workers: config.workers,
            gpu_permits: config.gpu_permits,
            ..ExecutorConfig::default()
        },
    );
    let executor_cancel = tokio_util::sync::CancellationToken::new();
    let executor_handle = tokio::spawn(executor.run(executor_cancel.clone()));
    tracing::info!("Stage executor started");

    // --- App state ---
    let state = AppState {
        pool,
        registry,
        blobs,
        inspector,
        config: Arc::new(config.clone()),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Workers finish their in-flight job before exiting.
    executor_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(30), executor_handle).await;
    tracing::info!("Stage executor stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
