//! Keysight P9374A USB network analyzer
//!
//! Shares the channel-1 parameter table with the ENA (without the `PLOG` and
//! `PLIN` formats) and adds multi-trace handling: trace enumeration across
//! channel slots, per-trace [`Trace`] handles, and trace creation/deletion.

use crate::params::{VnaModel, VnaParameters};
use crate::trace::{self, Trace, TraceInfo, S_PARAMETERS};
use crate::NetworkAnalyzer;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tfe_core::codec::{self, Identity, PairEncoding, TraceData};
use tfe_core::error::{ErrorKind, InstrumentError, InstrumentResult};
use tfe_core::parameter::{Domain, Parameter};
use tfe_core::registry::{Bundle, ParameterSet};
use tfe_core::transport::{self, SharedTransport};
use tracing::{debug, info, instrument, warn};

/// Channel slots scanned by [`P9374a::traces`] unless configured otherwise.
pub const DEFAULT_CHANNEL_SLOTS: u32 = 8;

/// Driver for the P9374A.
pub struct P9374a {
    name: String,
    transport: SharedTransport,
    params: VnaParameters,
    sweep_values: Arc<Parameter<Vec<f64>>>,
    registry: ParameterSet,
    channel_slots: u32,
}

impl std::fmt::Debug for P9374a {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("P9374a")
            .field("name", &self.name)
            .field("channel_slots", &self.channel_slots)
            .finish()
    }
}

impl P9374a {
    pub async fn connect(
        name: &str,
        address: &str,
        timeout: Duration,
        terminator: &str,
    ) -> InstrumentResult<Self> {
        info!(name, address, "Connecting to P9374A");
        let transport = transport::open(address, timeout, terminator).await?;
        Self::with_transport(name, transport).await
    }

    /// Build the driver and select the first measurement as active.
    pub async fn with_transport(name: &str, transport: SharedTransport) -> InstrumentResult<Self> {
        let params = VnaParameters::new(&transport, VnaModel::P9374a);
        let sweep_values = Arc::new(
            Parameter::<Vec<f64>>::new("sweep_values")
                .with_label("Sweep Values")
                .with_description("stimulus of the active measurement (Hz or dBm)")
                .scpi_query(&transport, ":SENS1:X:VAL?"),
        );
        let mut registry = params.registry();
        registry.register(Arc::clone(&sweep_values));

        transport.write("CALC1:PAR:MNUM 1").await?;

        Ok(Self {
            name: name.to_string(),
            transport,
            params,
            sweep_values,
            registry,
            channel_slots: DEFAULT_CHANNEL_SLOTS,
        })
    }

    /// Number of channels scanned during trace enumeration.
    pub fn with_channel_slots(mut self, slots: u32) -> Self {
        self.channel_slots = slots.max(1);
        self
    }

    pub fn parameters(&self) -> &VnaParameters {
        &self.params
    }

    // ===== Data =====

    /// Stimulus values of the active measurement: frequencies for a
    /// frequency sweep, powers for a power sweep.
    pub async fn sweep_data(&self) -> InstrumentResult<Vec<f64>> {
        self.sweep_values.get().await
    }

    /// Active trace as `(magnitude dB, phase rad)` pairs.
    ///
    /// The display format is switched to `POL` for the read and then put
    /// back, also when the read fails. An odd-length reply is returned flat.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn trace(&self) -> InstrumentResult<TraceData> {
        let previous = self.params.trform.get().await?;
        self.params.trform.set("POL".to_string()).await?;

        let reply = self.transport.ask(":CALC1:DATA? FDATA").await;
        let restored = self.params.trform.restore(previous).await;

        let reply = match (reply, restored) {
            (Ok(reply), Ok(())) => reply,
            (Ok(_), Err(err)) => return Err(err),
            (Err(err), restored) => {
                if let Err(restore_err) = restored {
                    warn!(error = %restore_err, "Failed to restore trace format");
                }
                return Err(err);
            }
        };

        Ok(match codec::decode_complex(&reply, PairEncoding::RealImag)? {
            codec::ComplexTrace::Complex(points) => TraceData::Paired(
                points
                    .into_iter()
                    .map(|z| (codec::magnitude_db(z), codec::phase(z, codec::AngleUnit::Radians)))
                    .collect(),
            ),
            codec::ComplexTrace::Flat(values) => TraceData::Flat(values),
        })
    }

    pub async fn data_to_mem(&self) -> InstrumentResult<()> {
        self.transport.write(":CALC1:MATH:MEM").await
    }

    // ===== Traces =====

    /// Every trace defined in the scanned channel slots.
    ///
    /// A channel whose catalog cannot be decoded is logged and skipped;
    /// transport failures end the scan.
    pub async fn traces(&self) -> InstrumentResult<Vec<TraceInfo>> {
        let mut all = Vec::new();
        for channel in 1..=self.channel_slots {
            match trace::channel_catalog(&self.transport, channel).await {
                Ok(found) => {
                    debug!(channel, traces = found.len(), "Read channel catalog");
                    all.extend(found);
                }
                Err(e) if e.kind() == ErrorKind::Protocol => {
                    warn!(channel, error = %e, "Skipping unreadable channel catalog");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(all)
    }

    /// Handle to trace `number` of `channel`. The trace need not exist yet.
    pub fn trace_handle(&self, channel: u32, number: u32) -> Trace {
        Trace::new(Arc::clone(&self.transport), channel, number)
    }

    /// Create trace `number` measuring `parameter` on `channel` and show it
    /// in the channel's window.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn define_trace(
        &self,
        channel: u32,
        number: u32,
        parameter: &str,
    ) -> InstrumentResult<Trace> {
        Domain::choices(S_PARAMETERS).check("s_parameter", &parameter.into())?;
        let handle = self.trace_handle(channel, number);
        if handle.exists().await? {
            return Err(InstrumentError::validation(
                "trace",
                format!("trace {} already exists on channel {}", number, channel),
            ));
        }

        let trace_name = trace::trace_name(channel, parameter, number);
        self.transport
            .write(&format!(
                "CALC{}:PAR:DEF:EXT '{}',{}",
                channel, trace_name, parameter
            ))
            .await?;
        self.transport
            .write(&format!(
                "DISP:WIND{}:TRAC{}:FEED '{}'",
                channel, number, trace_name
            ))
            .await?;
        Ok(handle)
    }

    /// Delete trace `number` of `channel`.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn delete_trace(&self, channel: u32, number: u32) -> InstrumentResult<()> {
        let info = self.trace_handle(channel, number).info().await?.ok_or_else(|| {
            InstrumentError::Unsupported(format!(
                "trace {} of channel {} does not exist",
                number, channel
            ))
        })?;
        self.transport
            .write(&format!("CALC{}:PAR:DEL '{}'", channel, info.name))
            .await
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
impl NetworkAnalyzer for P9374a {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> VnaModel {
        VnaModel::P9374a
    }

    fn registry(&self) -> &ParameterSet {
        &self.registry
    }

    async fn identify(&self) -> InstrumentResult<Identity> {
        codec::parse_idn(&self.transport.ask("*IDN?").await?)
    }

    async fn frequency_axis(&self) -> InstrumentResult<Vec<f64>> {
        self.sweep_data().await
    }

    async fn trace(&self) -> InstrumentResult<TraceData> {
        P9374a::trace(self).await
    }
}
