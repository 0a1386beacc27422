use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::relay::WorkerConfig;

/// Tracing filter used when neither `RUST_LOG` nor `log.filter` is set
pub const DEFAULT_LOG_FILTER: &str = "relay_server=debug,relay_media=info,tower_http=debug";

/// Server configuration.
///
/// Layered as: built-in defaults, then `relay.toml` (or the file named by
/// `RELAY_CONFIG`), then `RELAY__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Runtime worker threads; the runtime's default when unset
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    /// Prefix of generated sink URLs
    #[serde(default = "default_media_host")]
    pub media_host: String,
    /// Name looked up in the transport factory
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_replay_delay_secs")]
    pub replay_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub setup_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub io_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_media_host() -> String {
    "relay-out".to_string()
}

fn default_transport() -> String {
    "flv".to_string()
}

fn default_container() -> String {
    "flv".to_string()
}

fn default_replay_delay_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            worker_threads: None,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            media_host: default_media_host(),
            transport: default_transport(),
            container: default_container(),
            replay_delay_secs: default_replay_delay_secs(),
            setup_timeout_secs: default_timeout_secs(),
            io_timeout_secs: default_timeout_secs(),
        }
    }
}

impl RelaySettings {
    pub fn replay_delay(&self) -> Duration {
        Duration::from_secs(self.replay_delay_secs)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            container: self.container.clone(),
            setup_timeout: Duration::from_secs(self.setup_timeout_secs),
            io_timeout: Duration::from_secs(self.io_timeout_secs),
        }
    }
}

impl LogConfig {
    pub fn filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let builder = match std::env::var("RELAY_CONFIG") {
            Ok(path) => config::Config::builder().add_source(config::File::with_name(&path)),
            Err(_) => config::Config::builder().add_source(config::File::with_name("relay").required(false)),
        };

        let config = builder
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Load from one file and an explicit environment map, ignoring the process environment
    pub fn from_sources(file: Option<&Path>, env: config::Map<String, String>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file));
        }

        let config = builder
            .add_source(environment().source(Some(env)))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("RELAY")
        .separator("__")
        .try_parsing(true)
}
