//! Driver configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. built-in defaults ([`DriverConfig::default`])
//! 2. a TOML file (`config/bbbgpio.toml` unless another path is given)
//! 3. environment variables prefixed with `BBBGPIO_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use bbbgpio::config::DriverConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DriverConfig::load()?;
//! config.validate()?;
//! println!("device: {}", config.device.name);
//! # Ok(())
//! # }
//! ```
//!
//! `BBBGPIO_BACKEND__KIND=mmio` selects the memory-mapped backend without
//! touching the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::irq::{ProbeSettings, DEFAULT_PROBE_ROUNDS, DEFAULT_PROBE_SETTLE};
use crate::logging::OutputFormat;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/bbbgpio.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BBBGPIO_";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A source could not be read or did not match the schema.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Values loaded but are not usable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level driver configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Device identity
    pub device: DeviceConfig,
    /// Interrupt probing bounds
    pub interrupt: InterruptConfig,
    /// Register backend selection
    pub backend: BackendConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Device identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Name used in log records
    pub name: String,
    /// Device node name
    pub node: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "bbbgpio".to_string(),
            node: "bbbgpio0".to_string(),
        }
    }
}

/// Interrupt probe bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    /// Probe windows opened before giving up
    pub probe_rounds: u32,
    /// Wait inside each probe window, in microseconds
    pub probe_settle_us: u64,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            probe_rounds: DEFAULT_PROBE_ROUNDS,
            probe_settle_us: DEFAULT_PROBE_SETTLE.as_micros() as u64,
        }
    }
}

impl InterruptConfig {
    /// Probe loop bounds for the device.
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            rounds: self.probe_rounds,
            settle: Duration::from_micros(self.probe_settle_us),
        }
    }
}

/// Register backend kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory registers with a scriptable interrupt controller
    #[default]
    Simulated,
    /// Bank windows mapped from physical memory
    Mmio,
}

/// Register backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Which backend to drive
    pub kind: BackendKind,
    /// Memory device mapped by the mmio backend
    pub mem_path: PathBuf,
    /// Line the simulated interrupt controller reports to probes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sim_irq_line: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Simulated,
            mem_path: PathBuf::from("/dev/mem"),
            sim_irq_line: None,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: OutputFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
        }
    }
}

impl DriverConfig {
    /// Load configuration from the default file and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(path.as_ref())
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            )));
        }

        if self.interrupt.probe_rounds == 0 {
            return Err(ConfigError::Invalid(
                "interrupt.probe_rounds must be at least 1".to_string(),
            ));
        }

        if self.backend.kind == BackendKind::Mmio && self.backend.mem_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "backend.mem_path is required for the mmio backend".to_string(),
            ));
        }

        if self.device.name.trim().is_empty() {
            return Err(ConfigError::Invalid("device.name must not be empty".to_string()));
        }

        Ok(())
    }
}
