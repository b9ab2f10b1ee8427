//! Structured logging setup
//!
//! Provides JSON-formatted and human-readable logging with optional file output.
//! `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingConfig;
use anyhow::Result;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type OutputLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the level filter, preferring `RUST_LOG` over `config.level`
///
/// # Errors
///
/// Returns an error if neither source holds a valid filter directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.level)?),
    }
}

fn output_layer<W>(json: bool, ansi: bool, writer: W) -> OutputLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed()
    }
}

/// One formatting layer for stdout, plus one for `config.file_path` if set
///
/// # Errors
///
/// Returns an error if the log file cannot be opened for appending.
pub fn output_layers(config: &LoggingConfig) -> Result<Vec<OutputLayer>> {
    let mut layers = vec![output_layer(config.json_format, true, std::io::stdout)];

    if let Some(file_path) = &config.file_path {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        layers.push(output_layer(config.json_format, false, Arc::new(file)));
    }

    Ok(layers)
}

/// Initialize logging based on configuration.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log file cannot be
/// opened, or a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(output_layers(config)?)
        .with(env_filter(config)?)
        .try_init()?;
    Ok(())
}

/// Render a payload for logging, or `None` when payloads are excluded
pub fn payload_field(include_payload: bool, payload: &[u8]) -> Option<String> {
    include_payload.then(|| String::from_utf8_lossy(payload).into_owned())
}

/// Create a span carrying the coordinates of a dispatched message.
///
/// ```ignore
/// let span = message_span!(message);
/// ```
#[macro_export]
macro_rules! message_span {
    ($message:expr) => {
        tracing::info_span!(
            "message",
            topic = %$message.topic,
            partition = $message.partition,
            offset = $message.offset,
            received_at = %$message.metadata.received_at
        )
    };
}
