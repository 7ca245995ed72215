use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamfleet_api::config::ServerConfig;
use streamfleet_api::state::AppState;
use streamfleet_api::{background, router};
use streamfleet_fleet::cache::RedisTelemetryCache;
use streamfleet_fleet::config::FleetConfig;
use streamfleet_fleet::connection::VpsConnection;
use streamfleet_fleet::media::SignedMediaResolver;
use streamfleet_fleet::store::PgFleetStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "streamfleet_api=debug,streamfleet_fleet=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let fleet_config = FleetConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = streamfleet_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    streamfleet_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    streamfleet_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Fast store ---
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
    let cache = RedisTelemetryCache::connect(&redis_url)
        .await
        .expect("Failed to connect to Redis");
    tracing::info!("Redis connection established");

    // --- Fleet services ---
    let shell = VpsConnection::new(
        fleet_config.ssh_connect_timeout,
        fleet_config.ssh_command_timeout,
    );
    let media = SignedMediaResolver::from_config(&fleet_config);
    let state = AppState::new(
        Arc::new(PgFleetStore::new(pool)),
        Arc::new(cache),
        Arc::new(shell),
        Arc::new(media),
        config.clone(),
        fleet_config,
    );

    // --- Background tasks ---
    let cancel = CancellationToken::new();
    let handles = background::spawn_all(&state, &cancel);
    tracing::info!(tasks = handles.len(), "Background tasks started");

    // --- Router ---
    let app = router::build_app_router(state, &config);

    // --- Start server ---
    let addr = config.bind_addr();
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

    cancel.cancel();
    for handle in handles {
        if tokio::time::timeout(config.shutdown_timeout, handle).await.is_err() {
            tracing::warn!("Background task did not stop in time");
        }
    }
    tracing::info!("Background tasks stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
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
