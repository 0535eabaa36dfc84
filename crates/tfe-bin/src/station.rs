//! Instruments named in a station file.

use anyhow::{Context, Result};
use std::path::Path;
use tfe_core::config::{DriverKind, InstrumentConfig};
use tfe_core::error::InstrumentResult;
use tfe_core::registry::{Bundle, ParameterSet};
use tfe_driver_keysight::p9374a::DEFAULT_CHANNEL_SLOTS;
use tfe_driver_keysight::{EnaE5071c, NetworkAnalyzer, P9374a};
use tfe_driver_signalcore::Sc5511a;
use tfe_driver_sinko::Ad5760;
use tracing::info;

/// A connected instrument of any supported kind.
#[derive(Debug)]
pub enum Instrument {
    Ena(EnaE5071c),
    P9374a(P9374a),
    Sc5511a(Sc5511a),
    Ad5760(Ad5760),
}

impl Instrument {
    /// Connect to the instrument described by `config`.
    pub async fn connect(name: &str, config: &InstrumentConfig) -> Result<Self> {
        let timeout = config.timeout();
        let terminator = config.terminator.as_str();
        let instrument = match config.driver {
            DriverKind::EnaE5071c => Instrument::Ena(
                EnaE5071c::connect(name, &config.address, timeout, terminator).await?,
            ),
            DriverKind::P9374a => {
                let vna = P9374a::connect(name, &config.address, timeout, terminator).await?;
                Instrument::P9374a(
                    vna.with_channel_slots(config.channel_slots.unwrap_or(DEFAULT_CHANNEL_SLOTS)),
                )
            }
            DriverKind::Sc5511a => Instrument::Sc5511a(open_sc5511a(name, &config.address).await?),
            DriverKind::Ad5760 => {
                let context_path = config
                    .context_path
                    .as_deref()
                    .context("ad5760 entries need a context_path")?;
                Instrument::Ad5760(
                    Ad5760::connect(name, &config.address, context_path, timeout, terminator)
                        .await?,
                )
            }
        };
        info!(name, driver = %config.driver, "Instrument ready");
        Ok(instrument)
    }

    pub fn driver(&self) -> DriverKind {
        match self {
            Instrument::Ena(_) => DriverKind::EnaE5071c,
            Instrument::P9374a(_) => DriverKind::P9374a,
            Instrument::Sc5511a(_) => DriverKind::Sc5511a,
            Instrument::Ad5760(_) => DriverKind::Ad5760,
        }
    }

    pub fn registry(&self) -> &ParameterSet {
        match self {
            Instrument::Ena(vna) => vna.registry(),
            Instrument::P9374a(vna) => vna.registry(),
            Instrument::Sc5511a(generator) => generator.registry(),
            Instrument::Ad5760(source) => source.registry(),
        }
    }

    /// One-line identification.
    pub async fn identify(&self) -> InstrumentResult<String> {
        let identity = match self {
            Instrument::Ena(vna) => vna.identify().await?,
            Instrument::P9374a(vna) => vna.identify().await?,
            Instrument::Sc5511a(generator) => {
                let id = generator.identify().await?;
                return Ok(format!(
                    "{} {} (serial {}, firmware {}, hardware {}, manufactured {})",
                    id.vendor,
                    id.model,
                    id.serial_number,
                    id.firmware_revision,
                    id.hardware_revision,
                    id.manufacture_date
                ));
            }
            Instrument::Ad5760(source) => {
                return Ok(format!("Analog Devices AD5760 ({})", source.name()));
            }
        };
        Ok(identity.to_string())
    }

    pub async fn apply_bundle(&mut self, bundle: &Bundle) -> InstrumentResult<()> {
        match self {
            Instrument::Ena(vna) => vna.apply_bundle(bundle).await,
            Instrument::P9374a(vna) => vna.apply_bundle(bundle).await,
            Instrument::Sc5511a(generator) => generator.apply_bundle(bundle).await,
            Instrument::Ad5760(source) => source.apply_bundle(bundle).await,
        }
    }

    /// Current value of every parameter, as display text.
    pub async fn snapshot(&self) -> Vec<(String, String)> {
        let registry = self.registry();
        let mut rows = Vec::new();
        for name in registry.names() {
            let shown = match registry.get_value(name).await {
                Ok(value) => value.to_string(),
                Err(e) => format!("<{}>", e),
            };
            rows.push((name.to_string(), shown));
        }
        rows
    }
}

#[cfg(feature = "sc5511a_sdk")]
async fn open_sc5511a(name: &str, serial: &str) -> Result<Sc5511a> {
    Ok(Sc5511a::open_vendor(name, serial).await?)
}

#[cfg(not(feature = "sc5511a_sdk"))]
async fn open_sc5511a(name: &str, _serial: &str) -> Result<Sc5511a> {
    anyhow::bail!(
        "instrument '{}' needs the SignalCore library; rebuild with the sc5511a_sdk feature",
        name
    )
}

/// Parse a TOML table of `name = value` settings.
pub fn parse_bundle(document: &str) -> Result<Bundle> {
    toml::from_str(document).context("invalid settings table")
}

pub fn load_bundle(path: &Path) -> Result<Bundle> {
    let document = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    parse_bundle(&document)
}
