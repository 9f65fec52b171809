//! Warden daemon entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden_core::repository::EventRepository;
use warden_core::view::ViewStore;
use warden_event_store::schema::MIGRATOR;
use warden_event_store::{PgEventRepository, PgLocker, PgViewStore};
use warden_spooler::Spooler;

use warden_daemon::config::DaemonConfig;
use warden_daemon::error::AppError;
use warden_daemon::state::AppState;
use warden_daemon::{projections, routes};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Warden daemon");

    let config = DaemonConfig::load(|key| std::env::var(key).ok())?;

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(config.database_url()?)
        .await?;
    MIGRATOR.run(&pool).await?;

    let event_repository: Arc<dyn EventRepository> =
        Arc::new(PgEventRepository::new(pool.clone()));
    let view_store: Arc<dyn ViewStore> = Arc::new(PgViewStore::new(pool.clone()));
    let locker = Arc::new(PgLocker::new(pool.clone()));

    let (registry, aggregate_heads) = projections::build_registry(&config, &view_store, &pool)
        .map_err(|e| AppError::Config(e.to_string()))?;

    // Start the spooler; it stops when the server does.
    let token = CancellationToken::new();
    let spooler = Spooler::new(
        config.spooler.clone(),
        registry,
        Arc::clone(&event_repository),
        locker,
    )
    .start(token.clone())
    .map_err(|e| AppError::Config(e.to_string()))?;

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::router(AppState::new(event_repository, view_store, aggregate_heads))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.listen_addr()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(token))
        .await?;

    spooler.shutdown();
    spooler.join().await;
    info!("Warden daemon stopped");

    Ok(())
}

/// Resolves on Ctrl-C, SIGTERM or when `token` is cancelled, and cancels
/// `token`.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
        () = token.cancelled() => {}
    }
    token.cancel();
}
