//! Probe configuration loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Probe configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Scanning and connection settings
    pub scan: ScanSettings,
    /// Test sequence settings
    pub test: TestSettings,
    /// Report settings
    pub report: ReportSettings,
}

/// Scanning and connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Discovery scan duration in seconds
    pub discovery_timeout_secs: u64,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: 15,
            connection_timeout_secs: 50,
        }
    }
}

impl ScanSettings {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

/// Timings and set points for the test sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSettings {
    /// Wait after requesting control, in milliseconds
    pub control_settle_ms: u64,
    /// Wait after each probed command, in milliseconds
    pub command_settle_ms: u64,
    /// Wait after start/stop and simulation steps, in milliseconds
    pub step_settle_ms: u64,
    /// How long to collect pedaling data, in seconds
    pub pedaling_secs: u64,
    /// Resistance level used when the device reports no range
    pub fallback_resistance_level: u8,
    /// Target power for the ERG probe, in watts
    pub target_power_watts: u16,
    /// Grade for the first simulation probe, in 0.01 %
    pub probe_grade: i16,
    /// Grade for the stationary simulation test, in 0.01 %
    pub sim_test_grade: i16,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            control_settle_ms: 2000,
            command_settle_ms: 1500,
            step_settle_ms: 3000,
            pedaling_secs: 5,
            fallback_resistance_level: 8,
            target_power_watts: 100,
            probe_grade: 306,
            sim_test_grade: 1000,
        }
    }
}

impl TestSettings {
    pub fn control_settle(&self) -> Duration {
        Duration::from_millis(self.control_settle_ms)
    }

    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }

    pub fn pedaling(&self) -> Duration {
        Duration::from_secs(self.pedaling_secs)
    }
}

/// Report output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Directory reports are written to
    pub output_dir: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: get_data_dir().join("reports"),
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "rideprobe", "RideProbe")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load configuration from the default location.
pub fn load_config() -> Result<ProbeConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load configuration from `path`; a missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<ProbeConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(ProbeConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Save configuration to `path`.
pub fn save_config_to(config: &ProbeConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
