//! Server configuration loading from file and environment variables.

use pulse_auth::DEFAULT_CLAIM_FORMAT;
use pulse_log::{PointerUpdate, QueryDescriptor};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound fetch settings for relayed notifications.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Identity used in the authorization exchange.
    #[serde(default)]
    pub authorization: AuthorizationConfig,

    /// The fragmented log derived events are published into.
    #[serde(default)]
    pub log: LogConfig,

    /// Credentials installed in the token cache at start-up.
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    /// Bridge from bus topics into the log publisher.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "pulse_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Relay fetch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Response statuses that count as a successful fetch.
    #[serde(default = "default_success_statuses")]
    pub success_statuses: Vec<u16>,

    /// Transport timeout for each outbound request, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// `Accept` header sent with every fetch.
    #[serde(default = "default_accept")]
    pub accept: String,
}

/// Authorization exchange configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationConfig {
    /// Client identity presented as the claim token.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Format of the claim token.
    #[serde(default = "default_claim_format")]
    pub claim_format: String,
}

/// Log publisher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Root container of the log. Publishing is off without one.
    #[serde(default)]
    pub root: Option<String>,

    /// Temporal property fragments are ordered by.
    #[serde(default = "default_tree_path")]
    pub tree_path: String,

    /// How the current-fragment pointer is swapped.
    #[serde(default)]
    pub pointer_update: PointerUpdate,
}

/// A credential seeded into the token cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    /// Resource or resource prefix the credential applies to.
    pub scope: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    pub access_token: String,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Bus topics (log keys) to consume.
    #[serde(default)]
    pub topics: Vec<String>,

    /// Description of the query recorded as provenance of new fragments.
    #[serde(default)]
    pub query: QueryDescriptor,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_success_statuses() -> Vec<u16> {
    vec![200, 201, 203, 204]
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_accept() -> String {
    "text/turtle".to_string()
}

fn default_client_id() -> String {
    "http://n063-04b.wall2.ilabt.iminds.be/replayer#me".to_string()
}

fn default_claim_format() -> String {
    DEFAULT_CLAIM_FORMAT.to_string()
}

fn default_tree_path() -> String {
    "https://saref.etsi.org/core/hasTimestamp".to_string()
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            success_statuses: default_success_statuses(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            accept: default_accept(),
        }
    }
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            claim_format: default_claim_format(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            root: None,
            tree_path: default_tree_path(),
            pointer_update: PointerUpdate::default(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PULSE_HOST` overrides `server.host`
/// - `PULSE_PORT` overrides `server.port`
/// - `PULSE_LOG_LEVEL` overrides `logging.level`
/// - `PULSE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `PULSE_CLIENT_ID` overrides `authorization.client_id`
/// - `PULSE_LOG_ROOT` overrides `log.root`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("PULSE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("PULSE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(level) = std::env::var("PULSE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("PULSE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(client_id) = std::env::var("PULSE_CLIENT_ID") {
        config.authorization.client_id = client_id;
    }
    if let Ok(root) = std::env::var("PULSE_LOG_ROOT") {
        if !root.trim().is_empty() {
            config.log.root = Some(root);
        }
    }

    Ok(config)
}
