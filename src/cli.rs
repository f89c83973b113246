//! Command line parsing for the relay binary

use std::path::PathBuf;

use clap::Parser;

use tcp_chat::{Result, ServerConfig};

/// Line-oriented TCP chat relay
#[derive(Parser, Debug)]
#[command(name = "tcp-chat")]
#[command(about = "Line-oriented multi-client TCP chat relay")]
#[command(override_usage = "[USAGE]: ./TCPChat $port")]
#[command(version)]
pub struct Cli {
    /// Port to listen on (default 8989)
    pub port: Option<u16>,

    /// JSON config file; flags given here override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Number of recent messages replayed to new clients
    #[arg(long, value_name = "N")]
    pub history: Option<usize>,

    /// Text file shown to every client before the name prompt
    #[arg(long, value_name = "PATH")]
    pub banner: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write logs to DIR/tcp_chat.log
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<String>,

    /// Do not erase the client's typed line before echoing it back
    #[arg(long)]
    pub no_erase: bool,
}

impl Cli {
    /// Defaults, then the config file, then flags.
    pub fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(history) = self.history {
            config.history_capacity = history;
        }
        if let Some(banner) = self.banner {
            config.banner_path = banner;
        }
        if let Some(level) = self.log_level {
            config.logger.log_level = level;
        }
        if let Some(dir) = self.log_dir {
            config.logger.enable_file_log = true;
            config.logger.log_file_path = dir;
        }
        if self.no_erase {
            config.erase_input_echo = false;
        }

        Ok(config)
    }
}
