//! Agilent/Keysight ENA E5071C network analyzer
//!
//! # Parameters
//!
//! All channel-1 settings of [`VnaParameters`] (frequency range, source
//! power, IF bandwidth, averaging, trigger source, display format ...), plus:
//!
//! - `fdata` (read-only) - stimulus frequencies of the current sweep, Hz
//! - `pdata` (read-only) - power axis of a power sweep, 1601 points from
//!   `power_start` to `power_stop`, dBm
//!
//! # Acquisition
//!
//! [`EnaE5071c::average`] runs the averaged-acquisition sequence described
//! in [`crate::acquisition`]; [`EnaE5071c::save_trace`] wraps it with the
//! frequency axis and writes a [`TraceRecord`].

use crate::acquisition;
use crate::params::{VnaModel, VnaParameters};
use crate::storage::{StorageFormat, TraceRecord};
use crate::NetworkAnalyzer;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tfe_core::codec::{self, Identity, TraceData};
use tfe_core::error::{InstrumentError, InstrumentResult};
use tfe_core::parameter::Parameter;
use tfe_core::registry::{Bundle, ParameterSet};
use tfe_core::transport::{self, SharedTransport};
use tracing::{info, instrument};

/// Points of the derived power axis.
pub const POWER_AXIS_POINTS: usize = 1601;

/// Driver for the E5071C.
///
/// # Example
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use tfe_driver_keysight::EnaE5071c;
/// # async fn example() -> tfe_core::InstrumentResult<()> {
/// let mut vna = EnaE5071c::connect("vna", "TCPIP0::192.168.1.20::5025::SOCKET", Duration::from_secs(5), "\n").await?;
/// vna.parameters().fcenter.set(6.5e9).await?;
/// vna.parameters().fspan.set(50e6).await?;
/// let record = vna.save_trace(100, "resonator.json".as_ref()).await?;
/// println!("saved {} points", record.len());
/// # Ok(())
/// # }
/// ```
pub struct EnaE5071c {
    name: String,
    transport: SharedTransport,
    params: VnaParameters,
    fdata: Arc<Parameter<Vec<f64>>>,
    pdata: Arc<Parameter<Vec<f64>>>,
    registry: ParameterSet,
    previous_save: Option<PathBuf>,
}

impl std::fmt::Debug for EnaE5071c {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnaE5071c")
            .field("name", &self.name)
            .field("previous_save", &self.previous_save)
            .finish()
    }
}

impl EnaE5071c {
    /// Connect over the network and build the driver. `terminator` ends
    /// every command line.
    pub async fn connect(
        name: &str,
        address: &str,
        timeout: Duration,
        terminator: &str,
    ) -> InstrumentResult<Self> {
        info!(name, address, "Connecting to ENA E5071C");
        let transport = transport::open(address, timeout, terminator).await?;
        Ok(Self::with_transport(name, transport))
    }

    /// Build the driver on an already open transport.
    pub fn with_transport(name: &str, transport: SharedTransport) -> Self {
        let params = VnaParameters::new(&transport, VnaModel::EnaE5071c);

        let fdata = Arc::new(
            Parameter::<Vec<f64>>::new("fdata")
                .with_label("Frequency Data")
                .with_unit("Hz")
                .scpi_query(&transport, ":SENS1:FREQ:DATA?"),
        );

        let start = Arc::clone(&params.power_start);
        let stop = Arc::clone(&params.power_stop);
        let pdata = Arc::new(
            Parameter::<Vec<f64>>::new("pdata")
                .with_label("Power Data")
                .with_unit("dBm")
                .with_hardware_read(move || {
                    let start = Arc::clone(&start);
                    let stop = Arc::clone(&stop);
                    Box::pin(async move {
                        Ok(codec::linspace(
                            start.get().await?,
                            stop.get().await?,
                            POWER_AXIS_POINTS,
                        ))
                    })
                }),
        );

        let mut registry = params.registry();
        registry.register(Arc::clone(&fdata));
        registry.register(Arc::clone(&pdata));

        Self {
            name: name.to_string(),
            transport,
            params,
            fdata,
            pdata,
            registry,
            previous_save: None,
        }
    }

    pub fn parameters(&self) -> &VnaParameters {
        &self.params
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Path of the last successful [`save_trace`](Self::save_trace).
    pub fn previous_save(&self) -> Option<&Path> {
        self.previous_save.as_deref()
    }

    // ===== Data =====

    /// Current display data as `(log magnitude dB, phase)` pairs.
    pub async fn trace(&self) -> InstrumentResult<TraceData> {
        let reply = self.transport.ask(":CALC:DATA:FDATA?").await?;
        Ok(codec::reshape_pairs(codec::parse_float_list(&reply)?))
    }

    /// Stimulus frequencies of the current sweep.
    pub async fn frequency_axis(&self) -> InstrumentResult<Vec<f64>> {
        self.fdata.get().await
    }

    /// Power axis of a power sweep.
    pub async fn power_axis(&self) -> InstrumentResult<Vec<f64>> {
        self.pdata.get().await
    }

    // ===== Actions =====

    /// Restart averaging from zero.
    pub async fn average_restart(&self) -> InstrumentResult<()> {
        self.transport.write("SENS1:AVER:CLE").await
    }

    /// Copy the current trace into memory for trace math.
    pub async fn data_to_mem(&self) -> InstrumentResult<()> {
        self.transport.write(":CALC1:MATH:MEM").await
    }

    /// Single trigger.
    pub async fn trigger(&self) -> InstrumentResult<()> {
        self.transport.write(":TRIG:SING").await
    }

    /// Return the analyzer to free-running front-panel operation.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn set_to_manual(&mut self) -> InstrumentResult<()> {
        self.params.rfout.set(1).await?;
        self.params.averaging.set(1).await?;
        self.params.avgnum.set(1).await?;
        self.params.average_trigger.set(0).await?;
        self.params.trform.set("PHAS".to_string()).await?;
        self.params.trigger_source.set("INT".to_string()).await
    }

    // ===== Composite operations =====

    /// Acquire a trace averaged over `count` sweeps.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn average(&mut self, count: u32) -> InstrumentResult<TraceData> {
        acquisition::averaged_trace(&self.transport, &self.params, count).await
    }

    /// Average `count` sweeps and write the result to `path`.
    ///
    /// The output format is checked before acquiring. The trigger source is
    /// left on `INT` afterwards so the display keeps updating.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn save_trace(&mut self, count: u32, path: &Path) -> InstrumentResult<TraceRecord> {
        StorageFormat::for_path(path)?;

        let frequency = self.frequency_axis().await?;
        let trace = self.average(count).await?;
        self.params.trigger_source.set("INT".to_string()).await?;

        let record = TraceRecord::from_polar(frequency, &trace)?;
        record.write(path).await?;
        self.previous_save = Some(path.to_path_buf());

        info!(path = %path.display(), points = record.len(), "Saved trace");
        Ok(record)
    }

    /// Repeat [`save_trace`](Self::save_trace) to the previous path.
    pub async fn save_trace_previous(&mut self, count: u32) -> InstrumentResult<TraceRecord> {
        let path = self.previous_save.clone().ok_or_else(|| {
            InstrumentError::validation("path", "no trace has been saved yet")
        })?;
        self.save_trace(count, &path).await
    }

    /// Write a short summary of the measurement settings to `<path>.txt`.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn save_important_info(&self, path: &Path) -> InstrumentResult<PathBuf> {
        let summary = format!(
            "{}\nPower: {}\nFrequency: {}\nSpan: {}\nEDel: {}\nNum_Pts: {}\n",
            self.name,
            self.params.power.get().await?,
            self.params.fcenter.get().await?,
            self.params.fspan.get().await?,
            self.params.electrical_delay.get().await?,
            self.params.num_points.get().await?,
        );

        let mut target = OsString::from(path.as_os_str());
        target.push(".txt");
        let target = PathBuf::from(target);
        tokio::fs::write(&target, summary).await?;
        Ok(target)
    }

    // ===== Bundles =====

    pub async fn apply_bundle(&mut self, bundle: &Bundle) -> InstrumentResult<()> {
        self.registry.apply_bundle(bundle).await
    }

    pub async fn read_bundle<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> InstrumentResult<Bundle> {
        self.registry.read_bundle(names).await
    }
}

#[async_trait]
impl NetworkAnalyzer for EnaE5071c {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> VnaModel {
        VnaModel::EnaE5071c
    }

    fn registry(&self) -> &ParameterSet {
        &self.registry
    }

    async fn identify(&self) -> InstrumentResult<Identity> {
        codec::parse_idn(&self.transport.ask("*IDN?").await?)
    }

    async fn frequency_axis(&self) -> InstrumentResult<Vec<f64>> {
        EnaE5071c::frequency_axis(self).await
    }

    async fn trace(&self) -> InstrumentResult<TraceData> {
        EnaE5071c::trace(self).await
    }
}
