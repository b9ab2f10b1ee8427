//! Kafka Sentinel - certificate-gated Kafka consumer
//!
#![doc = "Main entry point for the Kafka Sentinel binary."]

use anyhow::Result;

use kafka_sentinel::cli::{Cli, Commands};
use kafka_sentinel::commands;
use kafka_sentinel::config::Config;
use kafka_sentinel::logging::init_logging;
use kafka_sentinel::metrics::init_metrics_exporter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/sentinel.yaml");
    let config = Config::load(config_path, &cli)?;

    init_logging(&config.logging)?;
    if !std::path::Path::new(config_path).exists() {
        tracing::debug!("Config file not found at {}, using defaults", config_path);
    }
    for warning in config.load_warnings() {
        tracing::warn!("{}", warning);
    }
    init_metrics_exporter();

    match execute(cli.command(), config).await {
        Ok(code) => {
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Fatal error");
            std::process::exit(1);
        }
    }
}

async fn execute(command: Commands, config: Config) -> Result<i32> {
    match command {
        Commands::Run => {
            tracing::info!(environment = %config.environment, "Starting consumer");
            let report = commands::run::run_consumer(config).await?;
            tracing::info!(
                dispatched = report.dispatch.dispatched,
                skipped = report.dispatch.skipped,
                "Shutdown complete"
            );
            Ok(report.outcome.exit_code())
        }
        Commands::Verify => {
            tracing::info!("Verifying broker certificates");
            commands::verify::verify_brokers(config).await?;
            Ok(0)
        }
        Commands::Publish {
            payload,
            key,
            topic,
        } => {
            tracing::info!("Publishing one record");
            let report = commands::publish::publish_record(config, payload, key, topic).await?;
            println!(
                "Delivered to {} [{}] at offset {}",
                report.topic, report.partition, report.offset
            );
            Ok(0)
        }
    }
}
