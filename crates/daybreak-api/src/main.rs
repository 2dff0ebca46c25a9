//! Daybreak API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use daybreak_api::config::Config;
use daybreak_api::state::{AppState, Settings, Wiring};
use daybreak_core::clock::{Clock, SystemClock};
use daybreak_core::repository::EventRepository;
use daybreak_event_store::memory_event_repository::InMemoryEventRepository;
use daybreak_event_store::pg_event_repository::PgEventRepository;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Daybreak API server");

    // Read configuration from environment.
    let config = Config::from_env()?;
    tracing::info!(mode = ?config.mode, cadence = ?config.cadence(), "configuration loaded");

    // Pick the event store.
    let event_repository: Arc<dyn EventRepository> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            sqlx::migrate!("../../migrations").run(&pool).await?;
            Arc::new(PgEventRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory only");
            Arc::new(InMemoryEventRepository::new())
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Build application state.
    let app_state = AppState::assemble(
        event_repository,
        clock,
        Wiring::from_config(&config),
        Settings::from(&config),
    );

    let app = daybreak_api::app(app_state);

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
