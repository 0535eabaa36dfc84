//! Station configuration
//!
//! A station file lists the instruments on the bench and, per instrument, a
//! settings table that `tfe apply` sends as one bundle:
//!
//! ```toml
//! [instruments.vna]
//! driver = "ena_e5071c"
//! address = "TCPIP0::192.168.1.20::5025::SOCKET"
//! timeout_ms = 10000
//!
//! [instruments.vna.settings]
//! fcenter = 6.5e9
//! fspan = 50e6
//! power = -20
//! trform = "MLOG"
//! ```
//!
//! Files are loaded with Figment and then merged with `TFE_`-prefixed
//! environment variables, using `__` as the nesting separator
//! (`TFE_INSTRUMENTS__VNA__ADDRESS=...`).

use crate::registry::Bundle;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Config validation failed: {0}")]
    ValidationError(String),

    #[error("No instrument named '{0}' in config")]
    UnknownInstrument(String),
}

/// Driver selected for an instrument entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Agilent/Keysight ENA E5071C network analyzer
    EnaE5071c,
    /// Keysight P9374A USB network analyzer
    P9374a,
    /// SignalCore SC5511A RF generator
    Sc5511a,
    /// AD5760 evaluation board through ACE remoting
    Ad5760,
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverKind::EnaE5071c => "ena_e5071c",
            DriverKind::P9374a => "p9374a",
            DriverKind::Sc5511a => "sc5511a",
            DriverKind::Ad5760 => "ad5760",
        };
        write!(f, "{}", label)
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_terminator() -> String {
    "\n".to_string()
}

/// One instrument on the station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub driver: DriverKind,

    /// VISA resource or `host:port` for SCPI instruments, serial number for
    /// the SC5511A, `host:port` of the ACE server for the AD5760.
    pub address: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_terminator")]
    pub terminator: String,

    /// ACE context path of the board (AD5760 only).
    #[serde(default)]
    pub context_path: Option<String>,

    /// Channel slots scanned during trace enumeration (P9374A only).
    #[serde(default)]
    pub channel_slots: Option<u32>,

    /// Default parameter bundle for this instrument.
    #[serde(default)]
    pub settings: Bundle,
}

impl InstrumentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigLoadError> {
        if self.address.trim().is_empty() {
            return Err(ConfigLoadError::ValidationError(format!(
                "instrument '{}' has an empty address",
                name
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigLoadError::ValidationError(format!(
                "instrument '{}' timeout_ms must be positive",
                name
            )));
        }
        if self.driver == DriverKind::Ad5760 && self.context_path.is_none() {
            return Err(ConfigLoadError::ValidationError(format!(
                "instrument '{}' (ad5760) needs a context_path",
                name
            )));
        }
        Ok(())
    }
}

/// All instruments of a station, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentConfig>,
}

impl StationConfig {
    /// Load from `path`, then apply `TFE_` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
        }

        debug!("Loading station config from: {}", path.display());

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TFE_").split("__"));

        let config = Self::extract(figment)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(
            instruments = config.instruments.len(),
            "Loaded station config from {}",
            path.display()
        );
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        Self::extract(Figment::new().merge(Toml::string(document)))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: StationConfig = figment.extract()?;
        for (name, instrument) in &config.instruments {
            instrument.validate(name)?;
        }
        Ok(config)
    }

    /// Look up an instrument entry by name.
    pub fn instrument(&self, name: &str) -> Result<&InstrumentConfig, ConfigLoadError> {
        self.instruments
            .get(name)
            .ok_or_else(|| ConfigLoadError::UnknownInstrument(name.to_string()))
    }
}
