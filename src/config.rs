//! Configuration management for Kafka Sentinel
//!
//! Configuration is layered: an optional YAML file, then environment
//! variables, then CLI overrides. The result is checked by
//! [`Config::validate`] before any broker is contacted.

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::tls::MaterialEncoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment; `production` means TLS material is raw PEM
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Broker, TLS and naming configuration
    #[serde(default)]
    pub kafka: KafkaConfig,

    /// Message dispatch limits
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Shutdown timing
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Problems found while loading, held until logging is initialized
    #[serde(skip)]
    load_warnings: Vec<String>,
}

/// Kafka connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated broker URLs, e.g. `kafka+ssl://b1:9096,kafka+ssl://b2:9096`
    #[serde(default)]
    pub url: String,

    /// Certificate material
    #[serde(default)]
    pub tls: TlsMaterialConfig,

    /// Prefix applied to both topic and consumer group names
    #[serde(default)]
    pub prefix: String,

    /// Consumer group base name
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Topic base name
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Per-broker certificate verification timeout
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,

    /// Offset auto-commit interval
    #[serde(default = "default_commit_interval")]
    pub commit_interval_ms: u64,
}

/// TLS material as stored at rest (base64 or PEM depending on environment)
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct TlsMaterialConfig {
    /// Trusted root bundle
    #[serde(default)]
    pub trusted_cert: String,

    /// Client certificate
    #[serde(default)]
    pub client_cert: String,

    /// Client private key
    #[serde(default)]
    pub client_cert_key: String,
}

// Keep key material out of debug output and logs.
impl std::fmt::Debug for TlsMaterialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterialConfig")
            .field("trusted_cert", &format_args!("<{} bytes>", self.trusted_cert.len()))
            .field("client_cert", &format_args!("<{} bytes>", self.client_cert.len()))
            .field("client_cert_key", &"<redacted>")
            .finish()
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum handling units running at once
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Capacity of the channel between the consumer and the dispatcher
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,

    /// Log file path (if None, STDOUT only)
    pub file_path: Option<PathBuf>,

    /// Include message and delivery payloads in logs
    #[serde(default)]
    pub include_payload: bool,
}

/// Shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long the producer may spend flushing queued records
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_secs: u64,

    /// How long to wait for in-flight handling units after the loop ends
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_consumer_group() -> String {
    "heroku-kafka-demo-go".to_string()
}

fn default_topic() -> String {
    "order_events".to_string()
}

fn default_verify_timeout() -> u64 {
    10
}

fn default_commit_interval() -> u64 {
    1000
}

fn default_max_in_flight() -> usize {
    64
}

fn default_inbound_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_flush_timeout() -> u64 {
    5
}

fn default_drain_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            kafka: KafkaConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
            shutdown: ShutdownConfig::default(),
            load_warnings: Vec::new(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            tls: TlsMaterialConfig::default(),
            prefix: String::new(),
            consumer_group: default_consumer_group(),
            topic: default_topic(),
            verify_timeout_secs: default_verify_timeout(),
            commit_interval_ms: default_commit_interval(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
            include_payload: false,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            flush_timeout_secs: default_flush_timeout(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl KafkaConfig {
    /// Verification dial timeout
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    /// Offset auto-commit interval
    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }
}

impl ShutdownConfig {
    /// Producer flush timeout
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    /// Handling-unit drain timeout
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; the environment alone is enough
    /// to run, which is how the service is normally deployed. Loading
    /// runs before the subscriber exists, so nothing is logged here;
    /// rejected overrides are kept in [`Config::load_warnings`].
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    fn apply_env_vars(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an environment lookup function
    ///
    /// Split out from [`Config::load`] so overrides can be exercised
    /// without touching the process environment. Unparseable values
    /// leave the current setting alone and add a load warning.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(environment) = lookup("ENVIRONMENT") {
            self.environment = environment;
        }

        if let Some(url) = lookup("KAFKA_URL") {
            self.kafka.url = url;
        }
        if let Some(trusted) = lookup("KAFKA_TRUSTED_CERT") {
            self.kafka.tls.trusted_cert = trusted;
        }
        if let Some(cert) = lookup("KAFKA_CLIENT_CERT") {
            self.kafka.tls.client_cert = cert;
        }
        if let Some(key) = lookup("KAFKA_CLIENT_CERT_KEY") {
            self.kafka.tls.client_cert_key = key;
        }
        if let Some(prefix) = lookup("KAFKA_PREFIX") {
            self.kafka.prefix = prefix;
        }
        if let Some(group) = lookup("KAFKA_CONSUMER_GROUP") {
            self.kafka.consumer_group = group;
        }
        if let Some(topic) = lookup("KAFKA_TOPIC") {
            self.kafka.topic = topic;
        }

        if let Some(max) = lookup("SENTINEL_MAX_IN_FLIGHT") {
            match max.parse::<usize>() {
                Ok(v) => self.dispatch.max_in_flight = v,
                Err(_) => self.warn_invalid("SENTINEL_MAX_IN_FLIGHT", &max),
            }
        }

        if let Some(buffer) = lookup("SENTINEL_INBOUND_BUFFER") {
            match buffer.parse::<usize>() {
                Ok(v) => self.dispatch.inbound_buffer = v,
                Err(_) => self.warn_invalid("SENTINEL_INBOUND_BUFFER", &buffer),
            }
        }

        if let Some(level) = lookup("SENTINEL_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(json) = lookup("SENTINEL_JSON_LOGS") {
            match json.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.logging.json_format = true,
                "false" | "0" | "no" => self.logging.json_format = false,
                _ => self.warn_invalid("SENTINEL_JSON_LOGS", &json),
            }
        }

        if let Some(file) = lookup("SENTINEL_LOG_FILE") {
            self.logging.file_path = Some(PathBuf::from(file));
        }

        if let Some(include) = lookup("SENTINEL_INCLUDE_PAYLOAD") {
            match include.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.logging.include_payload = true,
                "false" | "0" | "no" => self.logging.include_payload = false,
                _ => self.warn_invalid("SENTINEL_INCLUDE_PAYLOAD", &include),
            }
        }
    }

    fn warn_invalid(&mut self, key: &str, value: &str) {
        self.load_warnings
            .push(format!("Invalid value for {}: {}", key, value));
    }

    /// Overrides that were rejected while loading
    ///
    /// The binary logs these once the subscriber is installed.
    pub fn load_warnings(&self) -> &[String] {
        &self.load_warnings
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// How the TLS material in this configuration is encoded at rest
    pub fn material_encoding(&self) -> MaterialEncoding {
        MaterialEncoding::for_environment(&self.environment)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` for absent required values and
    /// `ConfigError::Invalid` for out-of-range limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.url.trim().is_empty() {
            return Err(ConfigError::Missing("KAFKA_URL".to_string()));
        }
        if self.kafka.tls.trusted_cert.trim().is_empty() {
            return Err(ConfigError::Missing("KAFKA_TRUSTED_CERT".to_string()));
        }
        if self.kafka.tls.client_cert.trim().is_empty() {
            return Err(ConfigError::Missing("KAFKA_CLIENT_CERT".to_string()));
        }
        if self.kafka.tls.client_cert_key.trim().is_empty() {
            return Err(ConfigError::Missing("KAFKA_CLIENT_CERT_KEY".to_string()));
        }
        if self.kafka.consumer_group.is_empty() {
            return Err(ConfigError::Invalid(
                "consumer_group cannot be empty".to_string(),
            ));
        }
        if self.kafka.topic.is_empty() {
            return Err(ConfigError::Invalid("topic cannot be empty".to_string()));
        }
        if self.kafka.verify_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "verify_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.kafka.commit_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "commit_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.dispatch.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.max_in_flight must be greater than 0".to_string(),
            ));
        }
        if self.dispatch.inbound_buffer == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.inbound_buffer must be greater than 0".to_string(),
            ));
        }
        if self.shutdown.flush_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "shutdown.flush_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.shutdown.drain_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "shutdown.drain_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
