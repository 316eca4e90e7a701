use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorConfig {
    pub event_stream: EventStreamConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl CoordinatorConfig {
    /// Config with every optional section at its default.
    pub fn new(base_url: &str) -> Self {
        Self {
            event_stream: EventStreamConfig {
                base_url: base_url.to_string(),
                user_id: None,
                reconnect: ReconnectPolicy::default(),
            },
            simulation: SimulationConfig::default(),
            storage: StorageConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStreamConfig {
    pub base_url: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

/// What the stream consumer does after a transport error.
///
/// Never applied after the consumer closed the connection itself or was
/// told to shut down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ReconnectPolicy {
    /// Stay disconnected. The batch resumes on the next `restore`.
    #[default]
    Never,
    /// Reconnect with exponential backoff.
    #[serde(rename_all = "camelCase")]
    Backoff {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        /// Unlimited when absent.
        #[serde(default)]
        max_attempts: Option<u32>,
    },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` to give up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self {
            ReconnectPolicy::Never => None,
            ReconnectPolicy::Backoff {
                initial_delay_ms,
                max_delay_ms,
                max_attempts,
            } => {
                if attempt == 0 || max_attempts.is_some_and(|max| attempt > max) {
                    return None;
                }
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                let delay = initial_delay_ms.saturating_mul(factor).min(*max_delay_ms);
                Some(Duration::from_millis(delay))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_step")]
    pub step: u8,
    #[serde(default = "default_ceiling")]
    pub ceiling: u8,
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_step() -> u8 {
    2
}

fn default_ceiling() -> u8 {
    95
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            step: default_step(),
            ceiling: default_ceiling(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_blob_directory")]
    pub blob_directory: PathBuf,
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path()
        .unwrap_or_else(|| PathBuf::from(".batchwatch/data/batchwatch.db"))
}

fn default_blob_directory() -> PathBuf {
    crate::upload::default_blob_directory().unwrap_or_else(|| PathBuf::from(".batchwatch/blobs"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            blob_directory: default_blob_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    100
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}
