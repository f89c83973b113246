// Local time formatting for log timestamps
use chrono::Local;

// Global level filter parsed from the config
use log::LevelFilter;

// Dispatch builder for combining console and file outputs
use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};

// Standard I/O and filesystem operations (stdout, log directory creation)
use std::{fs, io};

// Used to install the global logger exactly once
use std::sync::OnceLock;

use crate::config::LoggerConfig;

/// A zero-sized handle around the `log` macros.
/// Clonable so every connection task can carry its own copy.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Logger {
    /// Logs a message at DEBUG level
    pub fn debug(&self, msg: &str) {
        log::debug!("{}", msg);
    }

    /// Logs a message at INFO level
    pub fn info(&self, msg: &str) {
        log::info!("{}", msg);
    }

    /// Logs a message at WARN level
    pub fn warn(&self, msg: &str) {
        log::warn!("{}", msg);
    }

    /// Logs a message at ERROR level
    pub fn error(&self, msg: &str) {
        log::error!("{}", msg);
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Parse a level name, falling back to Info.
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse::<LevelFilter>().unwrap_or(LevelFilter::Info)
}

/// Path of the log file for `name` inside `dir`.
pub fn log_file_name(dir: &str, name: &str) -> String {
    let safe_name = name.replace('.', "_");
    if dir.is_empty() {
        format!("{}.log", safe_name)
    } else {
        format!("{}/{}.log", dir.trim_end_matches('/'), safe_name)
    }
}

/// Install the global logger according to `cfg`. Later calls return the
/// same handle and leave the first configuration in place.
pub fn init_logger(name: &str, cfg: &LoggerConfig) -> Logger {
    *LOGGER.get_or_init(|| {
        let mut base = Dispatch::new().level(parse_level(&cfg.log_level));

        // Console branch: timestamp, name, coloured level, message
        if cfg.enable_console_log {
            let nm = name.to_string();
            let datefmt = cfg.date_format.clone();
            let colors = ColoredLevelConfig::new()
                .info(Color::Green)
                .warn(Color::Yellow)
                .error(Color::Red)
                .debug(Color::Blue)
                .trace(Color::Magenta);

            base = base.chain(
                Dispatch::new()
                    .format(move |out, message, record| {
                        out.finish(format_args!(
                            "\x1b[92m{}\x1b[0m - \x1b[94m{}\x1b[0m - {} - {}",
                            Local::now().format(&datefmt),
                            nm,
                            colors.color(record.level()),
                            message
                        ))
                    })
                    .chain(io::stdout()),
            );
        }

        // File branch: plain text or one JSON envelope per record
        if cfg.enable_file_log {
            if !cfg.log_file_path.is_empty() {
                let _ = fs::create_dir_all(&cfg.log_file_path);
            }

            let nm = name.to_string();
            let datefmt = cfg.date_format.clone();
            let enable_json = cfg.enable_json_log;
            let filepath = log_file_name(&cfg.log_file_path, name);

            let log_format_file = move |out: fern::FormatCallback, message: &std::fmt::Arguments, record: &log::Record| {
                if enable_json {
                    let envelope = serde_json::json!({
                        "timestamp": Local::now().format(&datefmt).to_string(),
                        "name":      nm,
                        "level":     record.level().to_string(),
                        "message":   message.to_string(),
                    });
                    out.finish(format_args!("{}", envelope))
                } else {
                    out.finish(format_args!(
                        "{} - {} - {} - {}",
                        Local::now().format(&datefmt),
                        nm,
                        record.level(),
                        message
                    ))
                }
            };

            // Don't panic on an unwritable log file; fall back to a sink
            let file_output: Box<dyn io::Write + Send> = match fern::log_file(&filepath) {
                Ok(fh) => Box::new(fh),
                Err(err) => {
                    eprintln!("Warning: could not open log file {}: {}", filepath, err);
                    Box::new(io::sink())
                }
            };

            base = base.chain(Dispatch::new().format(log_format_file).chain(file_output));
        }

        if let Err(err) = base.apply() {
            eprintln!("Warning: a global logger was already installed: {}", err);
        }

        Logger
    })
}
