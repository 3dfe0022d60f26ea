//! Configuration loader for sui-spammer

use anyhow::Result;
use core_logic::{ConfigError, SpamConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sim::SimConfig;
use crate::stats::{Network, RECENT_EPOCHS};

/// Top-level `config.toml`.
///
/// ```toml
/// network = "localnet"
/// stats_epochs = 14
///
/// [spam]
/// increment_delay_ms = 1000
/// max_consecutive_restarts = 10
///
/// [simulation]
/// start_epoch = 1
/// epoch_duration_secs = 60
/// state_file = "sim-state.json"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuiSpammerConfig {
    pub network: Network,
    /// Epochs listed by the `stats` command
    pub stats_epochs: usize,
    pub spam: SpamConfig,
    pub simulation: SimulationConfig,
}

impl Default for SuiSpammerConfig {
    fn default() -> Self {
        Self {
            network: Network::Localnet,
            stats_epochs: RECENT_EPOCHS,
            spam: SpamConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Settings of the in-process ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub start_epoch: u64,
    /// 0 keeps the epoch fixed
    pub epoch_duration_secs: u64,
    pub latency_ms: u64,
    /// Where the ledger is kept between runs. Empty keeps it in memory only
    pub state_file: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_epoch: 1,
            epoch_duration_secs: 60,
            latency_ms: 150,
            state_file: "sim-state.json".to_string(),
        }
    }
}

impl SimulationConfig {
    pub fn to_sim_config(&self) -> SimConfig {
        SimConfig {
            start_epoch: self.start_epoch,
            epoch_duration: (self.epoch_duration_secs > 0)
                .then(|| Duration::from_secs(self.epoch_duration_secs)),
            latency: Duration::from_millis(self.latency_ms),
            state_file: (!self.state_file.is_empty()).then(|| PathBuf::from(&self.state_file)),
            ..SimConfig::default()
        }
    }
}

impl SuiSpammerConfig {
    /// Load configuration from a TOML file
    ///
    /// # Example
    /// ```ignore
    /// let config = SuiSpammerConfig::from_path("config/config.toml")?;
    /// ```
    pub fn from_path(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string(),
            }
            .into());
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_string(),
            msg: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string(),
            msg: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.spam.validate()?;
        if self.stats_epochs == 0 {
            return Err(ConfigError::invalid("stats_epochs", "must be at least 1"));
        }
        Ok(())
    }
}
