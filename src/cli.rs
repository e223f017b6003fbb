use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "blacklist-checker",
    version,
    about = "IP blacklist checker for the MXToolbox API with API key rotation",
    long_about = "Checks IP addresses against the MXToolbox blacklist lookup API, spreading calls over several API keys and parking keys that hit the upstream rate limit."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BLACKLIST_CHECKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server port (overrides the configuration file and PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "BLACKLIST_CHECKER_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP API server
    Serve,

    /// Check IP addresses once and print the verdicts as JSON
    Check {
        /// IP addresses to check
        #[arg(value_name = "IP", required = true)]
        ips: Vec<String>,
    },

    /// Validate configuration file
    Config {
        /// Configuration file to validate
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run; `serve` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
