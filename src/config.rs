// Deserialize lets us read the settings from a JSON file
use serde::Deserialize;

// Paths for the banner resource and the config file itself
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};

//////////////////////
// LoggerConfig     //
//////////////////////

/// Where and how the relay writes its own log lines
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    /// Minimum level: "trace", "debug", "info", "warn", "error" or "off"
    pub log_level: String,

    /// Print coloured lines to stdout
    pub enable_console_log: bool,

    /// Also write `<log_file_path>/<name>.log`
    pub enable_file_log: bool,

    /// Directory for the log file (empty = working directory)
    pub log_file_path: String,

    /// chrono format string used for log timestamps
    pub date_format: String,

    /// Write the file branch as one JSON envelope per line
    pub enable_json_log: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_console_log: true,
            enable_file_log: false,
            log_file_path: "logs".to_string(),
            date_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            enable_json_log: false,
        }
    }
}

//////////////////////
// ServerConfig     //
//////////////////////

/// All the settings the relay needs
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// IP or hostname to listen on
    pub host: String,

    /// Port number (0 lets the OS pick one)
    pub port: u16,

    /// How many recent chat lines are replayed to a new joiner
    pub history_capacity: usize,

    /// Text file streamed to every connection before the name prompt
    pub banner_path: PathBuf,

    /// First line sent on every connection
    pub welcome_message: String,

    /// Sent (without newline) right before reading the display name
    pub name_prompt: String,

    /// Queue a cursor-up/clear-line sequence before each read so the
    /// client's typed line is replaced by the broadcast echo
    pub erase_input_echo: bool,

    /// Milliseconds to sleep after a failed accept
    pub accept_error_backoff_ms: u64,

    /// How many Tokio worker threads to spin up (defaults to cpu-1)
    pub worker_threads: usize,

    /// Logging settings
    pub logger: LoggerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8989,
            history_capacity: 10,
            banner_path: PathBuf::from("logo.txt"),
            welcome_message: "Welcome to TCP-Chat!".to_string(),
            name_prompt: "[ENTER YOUR NAME]:".to_string(),
            erase_input_echo: true,
            accept_error_backoff_ms: 100,
            // Default worker threads = #cores minus one, but at least one
            worker_threads: num_cpus::get().saturating_sub(1).max(1),
            logger: LoggerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load settings from a JSON file; keys that are missing keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ChatError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ChatError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ChatError::config("host must not be empty"));
        }
        if self.worker_threads == 0 {
            return Err(ChatError::config("worker_threads must be at least 1"));
        }
        Ok(())
    }

    /// The "host:port" string handed to the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
