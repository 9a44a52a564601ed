mod config;
mod db;
mod event;
mod frame;
mod routes;
mod services;
mod state;
mod substrate;

use std::process::ExitCode;

use tokio::sync::oneshot;
use tokio::time::{Duration, timeout};

use crate::config::Config;
use crate::event::Origin;
use crate::services::relay::RelayError;
use crate::substrate::{Substrate, SubstrateError};

/// Bound on how long the relay gets to tear down its listener.
const RELAY_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("event store: {0}")]
    Store(#[from] SubstrateError),
    #[error("relay: {0}")]
    Relay(#[from] RelayError),
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server stopped unexpectedly")]
    ServerStopped,
    #[error("relay subscription lost")]
    RelayLost,
}

/// Why the main loop stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Signal,
    RelayLost,
    ServerStopped,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "canvas-relay exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), RunError> {
    let substrate = Substrate::open(&config.store_url, config.db_max_connections)?;
    let origin = Origin::generate();
    let state = state::AppState::new(&config, &substrate, origin);

    let mut relay = services::session::start_relay(&state).await?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| RunError::Bind { addr: addr.clone(), source })?;

    let app = routes::app(state.clone(), &config.cors);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tracing::info!(%addr, %origin, channel = %state.relay.channel(), "canvas-relay listening");

    let stop = tokio::select! {
        () = shutdown_signal() => Stop::Signal,
        () = relay.lost() => Stop::RelayLost,
        result = &mut server => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "server failed"),
                Err(e) => tracing::error!(error = %e, "server task panicked"),
            }
            Stop::ServerStopped
        }
    };

    tracing::info!(reason = ?stop, "shutting down");
    if timeout(RELAY_STOP_TIMEOUT, relay.unsubscribe()).await.is_err() {
        tracing::warn!("relay did not stop in time");
    }
    let closed = services::fanout::close_all(&state).await;
    tracing::info!(closed, "closed client connections");

    if stop != Stop::ServerStopped {
        let _ = stop_tx.send(());
        if timeout(config.shutdown_drain, &mut server).await.is_err() {
            tracing::warn!(drain_secs = config.shutdown_drain.as_secs(), "connections did not drain in time");
            server.abort();
        }
    }

    match stop {
        Stop::Signal => {}
        Stop::RelayLost => return Err(RunError::RelayLost),
        Stop::ServerStopped => return Err(RunError::ServerStopped),
    }
    tracing::info!("canvas-relay stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
