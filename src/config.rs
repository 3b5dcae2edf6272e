//! Election tunables.

use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;
use crate::constants::FINALIZE_WAIT;
use crate::constants::MAX_NOTIFICATION_INTERVAL;
use crate::constants::WORKER_POLL_INTERVAL;

/// Configuration settings for the leader election subsystem.
///
/// The defaults reproduce the protocol constants; deployments mostly tune
/// nothing here except the backoff cap on high-latency links.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElectionConfig {
    /// Wait applied once a quorum supports the current proposal, to give a
    /// better candidate a last chance to show up (milliseconds). Doubles as
    /// the initial notification poll timeout.
    #[serde(default = "default_finalize_wait_ms")]
    pub finalize_wait_ms: u64,

    /// Upper bound for the exponential notification timeout backoff
    /// (milliseconds).
    #[serde(default = "default_max_notification_interval_ms")]
    pub max_notification_interval_ms: u64,

    /// Poll timeout of the messenger workers (milliseconds).
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,
}

fn default_finalize_wait_ms() -> u64 {
    FINALIZE_WAIT.as_millis() as u64
}

fn default_max_notification_interval_ms() -> u64 {
    MAX_NOTIFICATION_INTERVAL.as_millis() as u64
}

fn default_worker_poll_interval_ms() -> u64 {
    WORKER_POLL_INTERVAL.as_millis() as u64
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            finalize_wait_ms: default_finalize_wait_ms(),
            max_notification_interval_ms: default_max_notification_interval_ms(),
            worker_poll_interval_ms: default_worker_poll_interval_ms(),
        }
    }
}

impl ElectionConfig {
    /// Loads the configuration from an optional file merged with
    /// `FLE_`-prefixed environment variables.
    pub fn from_file(config_path: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(Environment::with_prefix("fle"))
            .build()?;

        let cfg: ElectionConfig = s.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the tunables against each other.
    pub fn validate(&self) -> Result<()> {
        if self.finalize_wait_ms == 0 {
            return Err(ConfigError::Message(
                "finalize_wait_ms must be greater than 0".into(),
            )
            .into());
        }

        if self.max_notification_interval_ms < self.finalize_wait_ms {
            return Err(ConfigError::Message(
                "max_notification_interval_ms must not be smaller than finalize_wait_ms".into(),
            )
            .into());
        }

        if self.worker_poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "worker_poll_interval_ms must be greater than 0".into(),
            )
            .into());
        }

        Ok(())
    }

    pub fn finalize_wait(&self) -> Duration {
        Duration::from_millis(self.finalize_wait_ms)
    }

    pub fn max_notification_interval(&self) -> Duration {
        Duration::from_millis(self.max_notification_interval_ms)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }
}
