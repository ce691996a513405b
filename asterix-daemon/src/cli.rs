//! CLI argument definitions for asterix-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Asterix ingestion daemon.
///
/// Loads `asterix.toml`, optionally starts a UDP or capture-file receiver,
/// and keeps it running until SIGINT/SIGTERM.
#[derive(Parser, Debug)]
#[command(name = "asterix-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to asterix.toml configuration file.
    #[arg(short, long, default_value = "asterix.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override receiver autostart mode (none, udp, capture).
    #[arg(long)]
    pub autostart: Option<String>,

    /// Override the capture file replayed when autostart is "capture".
    #[arg(long)]
    pub capture_file: Option<PathBuf>,

    /// Override the capture filter or filter expression.
    #[arg(long)]
    pub filter: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut asterix_core::AsterixConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(autostart) = &self.autostart {
            config.receiver.autostart = autostart.clone();
        }
        if let Some(path) = &self.capture_file {
            config.receiver.capture.file_path = path.display().to_string();
        }
        if let Some(filter) = &self.filter {
            config.receiver.capture.filter = filter.clone();
        }
    }
}
