use crate::core::csm::DEFAULT_METRIC_CAPACITY;
use config::Config;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where and as whom we talk to the auction service
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(setter(into), default)]
pub struct NetworkConfig {
    /// Endpoint receiving bid requests
    pub bid_url: String,
    /// Endpoint serving the remote configuration
    pub config_url: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// User agent forwarded with bid calls
    pub user_agent: String,
    pub publisher_id: String,
    pub bundle_id: String,
    pub sdk_version: String,
    pub profile_id: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bid_url: "http://localhost:8080/inapp/v2".to_string(),
            config_url: "http://localhost:8080/v2.0/api/config".to_string(),
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(3),
            user_agent: concat!("bidcore/", env!("CARGO_PKG_VERSION")).to_string(),
            publisher_id: String::new(),
            bundle_id: String::new(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            profile_id: 235,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(default)]
pub struct ExecutorConfig {
    /// Network calls allowed to run at the same time
    pub max_concurrent_tasks: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(default)]
pub struct MetricsConfig {
    /// Distinct impression ids held before new ones are dropped
    pub capacity: usize,
    /// Metrics waiting to be sent before offers fail
    pub queue_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_METRIC_CAPACITY,
            queue_capacity: DEFAULT_METRIC_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
#[builder(default)]
pub struct StorageConfig {
    /// Directory for persisted state, kept in memory when unset
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(default)]
pub struct CacheConfig {
    pub max_slots: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_slots: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
#[builder(default)]
pub struct EngineConfig {
    pub network: NetworkConfig,
    pub executor: ExecutorConfig,
    pub metrics: MetricsConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<EngineConfig, anyhow::Error> {
        let cfg = Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .build()?;

        Ok(cfg.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogSink {
    Stdout {
        #[serde(default = "default_true")]
        color: bool,
        #[serde(default)]
        json: bool,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        json: bool,
        #[serde(default)]
        rotation: FileRotation,
        /// Rotated files kept around, 0 keeps everything
        #[serde(default)]
        max_files: usize,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub sinks: Vec<LogSink>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            sinks: vec![LogSink::Stdout {
                color: true,
                json: false,
            }],
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sinks.is_empty() {
            anyhow::bail!("At least one logging sink must be configured");
        }

        self.level.parse::<tracing::Level>().map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                self.level
            )
        })?;

        Ok(())
    }
}
