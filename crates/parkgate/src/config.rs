//! Gate configuration.
//!
//! Every field has a default matching the stock installation (four slots,
//! servo at 90° open / 0° closed, three second dwell). A TOML file may
//! override any subset; the binary's flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::gate::GateTiming;
use crate::store::JsonFileStorage;
use crate::transport::ServerConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    pub parking: ParkingConfig,
    pub gate: ServoConfig,
    pub scan: ScanConfig,
    pub inputs: InputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParkingConfig {
    pub capacity: usize,
    pub data_dir: PathBuf,
    pub registry_file: String,
    pub reserved_file: String,
}

impl Default for ParkingConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            data_dir: PathBuf::from("."),
            registry_file: JsonFileStorage::REGISTRY_FILE.to_string(),
            reserved_file: JsonFileStorage::RESERVED_FILE.to_string(),
        }
    }
}

impl ParkingConfig {
    pub fn storage(&self) -> JsonFileStorage {
        JsonFileStorage::new(
            self.data_dir.join(&self.registry_file),
            self.data_dir.join(&self.reserved_file),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServoConfig {
    pub open_angle: u16,
    pub closed_angle: u16,
    pub settle_ms: u64,
    pub dwell_ms: u64,
}

impl Default for ServoConfig {
    fn default() -> Self {
        let timing = GateTiming::default();
        Self {
            open_angle: timing.open_angle,
            closed_angle: timing.closed_angle,
            settle_ms: timing.settle.as_millis() as u64,
            dwell_ms: timing.dwell.as_millis() as u64,
        }
    }
}

impl ServoConfig {
    pub fn timing(&self) -> GateTiming {
        GateTiming {
            open_angle: self.open_angle,
            closed_angle: self.closed_angle,
            settle: Duration::from_millis(self.settle_ms),
            dwell: Duration::from_millis(self.dwell_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Input polling and per-loop re-arm delays.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub entry_rearm_ms: u64,
    pub exit_rearm_ms: u64,
    pub button_rearm_ms: u64,
    pub fault_backoff_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            debounce_ms: 30,
            entry_rearm_ms: 1_000,
            exit_rearm_ms: 1_000,
            button_rearm_ms: 2_000,
            fault_backoff_ms: 500,
        }
    }
}

impl InputConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.fault_backoff_ms)
    }
}

impl GateConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("invalid gate configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parking.capacity == 0 {
            anyhow::bail!("parking.capacity must be at least 1");
        }
        if self.scan.timeout_ms == 0 {
            anyhow::bail!("scan.timeout_ms must be greater than zero");
        }
        if self.inputs.poll_interval_ms == 0 {
            anyhow::bail!("inputs.poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}
