use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level runtime configuration, injected through [`crate::runtime::Runtime`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

/// Message bus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-agent mailbox capacity. A send to a full mailbox is rejected.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Cadence of the timeout sweeper.
    #[serde(default = "default_sweep_interval", with = "duration_ms")]
    pub sweep_interval: Duration,

    /// Bounded wait for the sweeper task on `stop`.
    #[serde(default = "default_stop_timeout", with = "duration_ms")]
    pub stop_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            sweep_interval: default_sweep_interval(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

/// Agent background-processing tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Poll timeout used by the background consumer loop between receives.
    #[serde(default = "default_poll_timeout", with = "duration_ms")]
    pub poll_timeout: Duration,

    /// Bounded wait for the consumer task on `stop_background_processing`.
    #[serde(default = "default_join_timeout", with = "duration_ms")]
    pub join_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_timeout: default_poll_timeout(),
            join_timeout: default_join_timeout(),
        }
    }
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_sweep_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_timeout() -> Duration {
    Duration::from_millis(100)
}

fn default_join_timeout() -> Duration {
    Duration::from_secs(1)
}

// Duration serialization helper, millisecond granularity.
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
