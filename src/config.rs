use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

pub const DEFAULT_MAX_DEPTH: usize = 100;
pub const DEFAULT_MAX_NODES: usize = 10_000;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,

    #[serde(default)]
    pub default_options: RenderOptions,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default = "default_expression_cache_size")]
    pub expression_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes: default_max_nodes(),
            default_options: RenderOptions::default(),
            cache: CacheConfig::default(),
            executor: ExecutorConfig::default(),
            expression_cache_size: default_expression_cache_size(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &str) -> InternalResult<Self> {
        from_file(path)
    }
}

/// Per-call switches. A value passed to a render call replaces the
/// configured defaults wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// Bypasses the result cache in both directions.
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub enable_performance_tracking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Zero disables expiry.
    #[serde(default = "default_cache_ttl", with = "duration_ms")]
    pub ttl: Duration,

    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: default_cache_ttl(),
            max_size: default_cache_max_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Ceiling on `onError`/`onSuccess`/`triggerEvent` nesting.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path.as_ref()).map_err(|e| {
        Error::Internal(format!(
            "Failed to open config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}

fn default_cache_ttl() -> Duration {
    Duration::from_millis(60_000)
}

fn default_cache_max_size() -> usize {
    100
}

fn default_max_chain_depth() -> usize {
    DEFAULT_MAX_CHAIN_DEPTH
}

fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}

fn default_expression_cache_size() -> usize {
    crate::expression::DEFAULT_CACHE_SIZE
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
