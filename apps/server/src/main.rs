mod admission;
mod config;
mod error;
mod hub;
mod observability;
mod presence;
mod registry;
mod relay;
mod routes;
mod session;
mod state;
mod validation;
mod voice;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::config::Config;
use crate::error::StartupError;
use crate::state::AppState;
use crate::voice::{seed_rooms, MemoryRoomStore, PgRoomStore, RoomStore};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    observability::init_tracing(config.production);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(component = "bootstrap", error = %e, "gateway stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let store: Arc<dyn RoomStore> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PgRoomStore::connect(url).await?),
        None => {
            tracing::warn!(
                component = "bootstrap",
                "DATABASE_URL not set, voice rooms are kept in memory"
            );
            Arc::new(MemoryRoomStore::new())
        }
    };

    if !config.voice_rooms.is_empty() {
        let seeded = seed_rooms(store.as_ref(), &config.voice_rooms).await?;
        tracing::info!(component = "bootstrap", seeded, "voice rooms seeded");
    }

    let addr = config.socket_addr()?;
    let state = AppState::new(config, store);
    if let Some(every) = state.config.status_interval {
        tokio::spawn(report_status(state.clone(), every));
    }

    let app = routes::app(state);
    serve(addr, app).await
}

/// Serves until ctrl-c. Accept failures are retried inside `axum::serve`
/// and per-connection I/O faults end only that connection, so an error here
/// is fatal.
async fn serve(addr: SocketAddr, app: Router) -> Result<(), StartupError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(component = "bootstrap", %addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(component = "bootstrap", "gateway shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(component = "bootstrap", error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn report_status(state: AppState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let status = state.status();
        if status.active_connections > 0 {
            tracing::info!(
                component = "status",
                active = status.active_connections,
                max = status.max_connections,
                identified = status.identified_users,
                voice_rooms = status.voice_rooms,
                "gateway status"
            );
        }
    }
}
