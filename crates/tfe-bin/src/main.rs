//! CLI Entry Point for the tfe instrument drivers
//!
//! Every command works on one instrument from the station file:
//!
//! ```bash
//! tfe --config station.toml info vna
//! tfe get vna power fcenter
//! tfe apply vna --settings sweep.toml
//! tfe save-trace vna --count 20 data/resonator.json --info
//! tfe traces pxi_vna
//! ```
//!
//! Logging goes through `tracing`; set `RUST_LOG=debug` for per-command
//! detail.

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod station;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tfe_core::config::StationConfig;
use tfe_driver_keysight::NetworkAnalyzer;

use station::{load_bundle, Instrument};

#[derive(Parser)]
#[command(name = "tfe")]
#[command(about = "Control the instruments of a measurement station", long_about = None)]
struct Cli {
    /// Station file (TOML)
    #[arg(long, global = true, default_value = "station.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify an instrument and print its parameters
    Info {
        /// Instrument name in the station file
        instrument: String,
    },

    /// Read parameters
    Get {
        instrument: String,

        /// Parameter names (all parameters when omitted)
        names: Vec<String>,
    },

    /// Apply the settings of the station file, or of a separate file
    Apply {
        instrument: String,

        /// TOML table of `name = value` pairs
        #[arg(long)]
        settings: Option<PathBuf>,
    },

    /// Take an averaged trace and save it (ENA E5071C)
    SaveTrace {
        instrument: String,

        /// Output file; `.h5`/`.hdf5` selects HDF5, anything else JSON
        path: PathBuf,

        /// Number of sweeps to average
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Also write the measurement settings next to the trace
        #[arg(long)]
        info: bool,
    },

    /// List the traces defined on a P9374A
    Traces { instrument: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let station = StationConfig::load(&cli.config)?;

    match cli.command {
        Commands::Info { instrument } => info(&station, &instrument).await,
        Commands::Get { instrument, names } => get(&station, &instrument, &names).await,
        Commands::Apply {
            instrument,
            settings,
        } => apply(&station, &instrument, settings).await,
        Commands::SaveTrace {
            instrument,
            path,
            count,
            info,
        } => save_trace(&station, &instrument, path, count, info).await,
        Commands::Traces { instrument } => traces(&station, &instrument).await,
    }
}

async fn connect(station: &StationConfig, name: &str) -> Result<Instrument> {
    let config = station.instrument(name)?;
    Instrument::connect(name, config)
        .await
        .with_context(|| format!("Failed to connect to '{}'", name))
}

async fn info(station: &StationConfig, name: &str) -> Result<()> {
    let instrument = connect(station, name).await?;
    println!("{} [{}]", name, instrument.driver());
    println!("  {}", instrument.identify().await?);
    println!();
    for (parameter, value) in instrument.snapshot().await {
        println!("  {:<20} {}", parameter, value);
    }
    Ok(())
}

async fn get(station: &StationConfig, name: &str, names: &[String]) -> Result<()> {
    let instrument = connect(station, name).await?;
    let registry = instrument.registry();
    let names: Vec<&str> = if names.is_empty() {
        registry.names()
    } else {
        names.iter().map(String::as_str).collect()
    };

    let bundle = registry.read_bundle(names).await?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

async fn apply(station: &StationConfig, name: &str, settings: Option<PathBuf>) -> Result<()> {
    let bundle = match settings {
        Some(path) => load_bundle(&path)?,
        None => station.instrument(name)?.settings.clone(),
    };
    if bundle.is_empty() {
        println!("Nothing to apply to '{}'", name);
        return Ok(());
    }

    let mut instrument = connect(station, name).await?;
    instrument.apply_bundle(&bundle).await?;
    for (parameter, value) in &bundle {
        println!("  {:<20} {}", parameter, value);
    }
    println!("Applied {} settings to '{}'", bundle.len(), name);
    Ok(())
}

async fn save_trace(
    station: &StationConfig,
    name: &str,
    path: PathBuf,
    count: u32,
    with_info: bool,
) -> Result<()> {
    let Instrument::Ena(mut vna) = connect(station, name).await? else {
        bail!("'{}' is not an ENA E5071C", name);
    };

    let record = vna.save_trace(count, &path).await?;
    println!(
        "Saved {} points averaged over {} sweeps to {}",
        record.len(),
        count,
        path.display()
    );
    if with_info {
        let info_path = vna.save_important_info(&path).await?;
        println!("Settings written to {}", info_path.display());
    }
    Ok(())
}

async fn traces(station: &StationConfig, name: &str) -> Result<()> {
    let Instrument::P9374a(vna) = connect(station, name).await? else {
        bail!("'{}' is not a P9374A", name);
    };

    let traces = vna.traces().await?;
    if traces.is_empty() {
        println!("No traces defined on '{}' ({})", name, vna.name());
        return Ok(());
    }
    for trace in traces {
        println!(
            "  CH{} TR{}  {:<4} {}",
            trace.channel, trace.number, trace.parameter, trace.name
        );
    }
    Ok(())
}
