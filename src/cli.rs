//! Command-line interface definition for Kafka Sentinel
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};

/// Kafka Sentinel - certificate-gated Kafka consumer
///
/// Verifies every broker certificate against the trusted root before
/// connecting, then consumes the configured topic while supervising
/// error and rebalance streams.
#[derive(Parser, Debug, Clone)]
#[command(name = "kafka-sentinel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/sentinel.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Verify brokers, connect, and consume until stopped
    Run,

    /// Verify every broker certificate and exit
    Verify,

    /// Verify brokers, publish one record, and wait for its delivery report
    Publish {
        /// Record payload
        #[arg(short, long)]
        payload: String,

        /// Optional record key
        #[arg(short, long)]
        key: Option<String>,

        /// Topic base name (prefix is still applied); defaults to the consumed topic
        #[arg(short, long)]
        topic: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The command to run, falling back to `run`
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/sentinel.yaml".to_string()),
            verbose: false,
            command: None,
        }
    }
}
