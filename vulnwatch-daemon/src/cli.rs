//! CLI argument definitions for vulnwatch-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use vulnwatch_core::config::VulnwatchConfig;

/// VulnWatch dependency vulnerability monitoring daemon.
///
/// Serves the manifest upload and notification API, and runs the
/// rescan and digest schedulers.
#[derive(Parser, Debug)]
#[command(name = "vulnwatch-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to vulnwatch.toml configuration file.
    #[arg(short, long, default_value = "/etc/vulnwatch/vulnwatch.toml")]
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

    /// Override the HTTP API bind address (e.g. 0.0.0.0:8080).
    #[arg(long)]
    pub bind: Option<String>,

    /// TOML file with users and projects to load into the in-memory store.
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply CLI overrides on top of file and environment settings.
    pub fn apply_overrides(&self, config: &mut VulnwatchConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "vulnwatch-daemon",
            "--config",
            "/tmp/vulnwatch.toml",
            "--log-format",
            "pretty",
            "--bind",
            "0.0.0.0:9000",
        ]);
        let mut config = VulnwatchConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = DaemonCli::parse_from(["vulnwatch-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/vulnwatch/vulnwatch.toml"));
        assert!(cli.seed.is_none());
        assert!(!cli.validate);
    }
}
