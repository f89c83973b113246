//! Line-oriented multi-client chat relay over TCP.
//!
//! Clients connect, send a display name, and from then on every line one of
//! them sends is broadcast to all connected clients. The last few lines are
//! replayed to each newcomer.

// Settings read from defaults, a JSON file and the command line.
pub mod config;

// Error taxonomy shared by the server and the binary.
pub mod error;

// Logging setup for server lifecycle events and relayed messages.
pub mod logger;

// Acceptor, per-connection sessions and the shared chat state.
pub mod server;

pub use config::{LoggerConfig, ServerConfig};
pub use error::{ChatError, Result};
pub use logger::{Logger, init_logger};
pub use server::run_server;

/// Start the relay and block until it shuts down:
/// 1. Validate the config.
/// 2. Build a multi-threaded Tokio runtime.
/// 3. Set up logging under `name`.
/// 4. Run the server.
pub fn start_server(name: &str, config: ServerConfig) -> Result<()> {
    config.validate()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("tcp-chat-worker")
        .enable_all()
        .build()
        .map_err(ChatError::Runtime)?;

    let logger = init_logger(name, &config.logger);

    rt.block_on(async {
        run_server(config, logger).await.inspect_err(|e| {
            logger.error(&format!("Server error: {}", e));
        })
    })
}
