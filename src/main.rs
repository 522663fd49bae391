//! DataLens Sync Service
//!
//! Backend core of the DataLens database-documentation dashboard:
//! - versioned schema snapshots chained per connection
//! - structural change detection between syncs
//! - synchronous quality analysis and fire-and-forget AI doc generation,
//!   both delegated to the external analysis service
//! - a recurring scheduler that re-syncs every registered connection and
//!   persists a snapshot only when the schema actually changed
//! - bounded per-session chat history for snapshot Q&A

mod analysis;
mod chat;
mod config;
mod diff;
mod error;
mod models;
mod routes;
mod scheduler;
mod session;
mod state;
mod store;
mod sync;

use crate::analysis::{AnalysisClient, AnalysisService};
use crate::config::Settings;
use crate::routes::create_router;
use crate::scheduler::Scheduler;
use crate::session::{InMemorySessionStore, SessionStore};
use crate::state::AppState;
use crate::store::{ConnectionStore, MemoryStore, PgStore, SnapshotStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting DataLens sync service...");

    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Stores: Postgres when DATABASE_URL is configured, in-memory otherwise.
    let (connections, snapshots): (Arc<dyn ConnectionStore>, Arc<dyn SnapshotStore>) =
        match &settings.database {
            Some(db_config) => {
                let store = Arc::new(PgStore::connect(db_config).await?);
                info!("Connected to PostgreSQL store at {}:{}", db_config.host, db_config.port);
                (store.clone(), store)
            }
            None => {
                warn!("DATABASE_URL not set, using in-memory store (data lost on restart)");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let analysis: Arc<dyn AnalysisService> = Arc::new(AnalysisClient::new(&settings.analysis)?);
    info!("Analysis service at {}", settings.analysis.base_url);

    let sessions: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::new(settings.chat.history_cap));

    let state = Arc::new(AppState::new(
        Arc::clone(&connections),
        Arc::clone(&snapshots),
        Arc::clone(&analysis),
        sessions,
    ));

    if settings.sync.enabled {
        let scheduler = Scheduler::new(
            settings.sync.interval,
            connections,
            snapshots,
            analysis,
            Arc::clone(&state.orchestrator),
        );
        tokio::spawn(scheduler.run());
    } else {
        warn!("Background sync disabled (SYNC_ENABLED=false)");
    }

    let app = create_router(Arc::clone(&state), &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));
    info!("Server listening on http://{}", addr);
    info!("");
    info!("API Endpoints:");
    info!("   POST   /api/connections                       - Register a connection");
    info!("   GET    /api/connections                       - List connections");
    info!("   DELETE /api/connections/{{id}}                  - Delete (cascades snapshots)");
    info!("   POST   /api/connections/{{id}}/sync             - Manual sync");
    info!("   GET    /api/connections/{{id}}/snapshots/latest - Latest snapshot");
    info!("   GET    /api/snapshots/{{id}}                    - Snapshot by id");
    info!("   GET    /api/doc-status/{{snapshotId}}           - Doc generation progress");
    info!("   POST   /api/chat                              - Ask about a snapshot");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,datalens_sync=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
