// === IMPORTS ===

// Arc lets every connection task share the chat state and the config.
use std::sync::Arc;

// AtomicUsize counts live connections for the logs.
use std::sync::atomic::{AtomicUsize, Ordering};

// Tokio's non-blocking TCP listener for incoming connections.
use tokio::net::TcpListener;

// broadcast: one-to-many channel used for the shutdown signal.
use tokio::sync::broadcast;

// Delay after a failed accept.
use tokio::time::{self, Duration};


// === MODULES ===

pub mod banner;
pub mod history;
pub mod message;
pub mod session;
pub mod state;

use crate::config::ServerConfig;
use crate::error::{ChatError, Result};
use crate::logger::Logger;
use crate::server::session::handle_connection;
use crate::server::state::{ChatState, SharedState};


// === RUN_SERVER ===

/// Binds, builds the shared state, installs the Ctrl+C listener and accepts
/// connections until shutdown. Only the bind can fail.
pub async fn run_server(config: ServerConfig, logger: Logger) -> Result<()> {
    let listener = bind_listener(&config).await?;
    logger.info(&format!("🚀 Listening on the port : {}", listener.local_addr()?.port()));

    let state: SharedState = Arc::new(ChatState::new(config.history_capacity, logger));

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let shutdown_handle = spawn_shutdown_listener(shutdown_tx.clone(), logger);

    accept_connections(listener, state, Arc::new(config), shutdown_rx, logger).await;

    shutdown_handle.abort();
    Ok(())
}

/// Open the listening socket; failure here is fatal for the process.
pub async fn bind_listener(config: &ServerConfig) -> Result<TcpListener> {
    let addr = config.bind_addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ChatError::Bind { addr, source })
}


// === CONNECTIONS ===

/// Accepts clients forever, one task each, until the shutdown channel fires.
/// A failed accept is logged and retried after a short pause.
pub async fn accept_connections(
    listener: TcpListener,
    state: SharedState,
    config: Arc<ServerConfig>,
    mut shutdown_rx: broadcast::Receiver<()>,
    logger: Logger,
) {
    let connection_count = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        let current = connection_count.fetch_add(1, Ordering::SeqCst) + 1;
                        logger.info(&format!("🔌 {} connected. Active connections: {}", addr, current));

                        // Small chat lines should go out immediately
                        if let Err(e) = stream.set_nodelay(true) {
                            logger.warn(&format!("⚠️ Failed to set TCP_NODELAY for {}: {}", addr, e));
                        }

                        let state = state.clone();
                        let config = config.clone();
                        let counter = connection_count.clone();

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, &state, &config, &logger).await {
                                logger.warn(&format!("⚠️ Error with {}: {}", addr, e));
                            }

                            let remaining = counter.fetch_sub(1, Ordering::SeqCst) - 1;
                            logger.info(&format!("🔌 {} disconnected. Active connections: {}", addr, remaining));
                        });
                    }
                    Err(e) => {
                        logger.warn(&format!("⚠️ Failed to accept connection: {}", e));
                        time::sleep(Duration::from_millis(config.accept_error_backoff_ms)).await;
                    }
                }
            }

            _ = shutdown_rx.recv() => {
                logger.info("🧹 Server received shutdown signal.");
                break;
            }
        }
    }
}

/// Waits for Ctrl+C and fires the shutdown channel. Clients are not told;
/// their sockets close when the process exits.
fn spawn_shutdown_listener(
    shutdown_tx: broadcast::Sender<()>,
    logger: Logger,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            logger.error(&format!("Failed to listen for ctrl_c: {}", e));
            return;
        }
        logger.warn("🛑 Ctrl+C received, shutting down.");
        let _ = shutdown_tx.send(());
    })
}
