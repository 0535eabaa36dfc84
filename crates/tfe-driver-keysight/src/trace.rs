//! Measurement traces of multi-trace analyzers.
//!
//! Traces live in numbered channels. `CALC{ch}:PAR:CAT:EXT?` lists a
//! channel's traces as alternating `name,parameter` items, for example
//! `"CH1_S21_1,S21,CH1_S11_2,S11"`. A channel with nothing defined answers
//! with an empty string or `"NO CATALOG"`.
//!
//! A [`Trace`] handle does not cache anything. Every data read first checks
//! the catalog again so a trace deleted from the front panel reads as
//! `None` rather than as stale data.

use serde::Serialize;
use tfe_core::codec::{self, ComplexTrace, PairEncoding};
use tfe_core::error::{InstrumentError, InstrumentResult};
use tfe_core::parameter::Domain;
use tfe_core::transport::SharedTransport;
use tracing::{debug, warn};

/// Measurable scattering parameters.
pub const S_PARAMETERS: &[&str] = &["S11", "S12", "S21", "S22"];

/// One entry of a channel catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceInfo {
    pub channel: u32,
    pub number: u32,
    pub name: String,
    pub parameter: String,
}

/// Decode one channel's catalog reply.
///
/// Trace numbers are read from the trailing `_N` of the name. A name
/// without one (front-panel measurements may be named freely) gets its
/// 1-based position in the catalog; [`P9374a::traces`] replaces that with
/// the analyzer's own measurement number when it can.
///
/// [`P9374a::traces`]: crate::P9374a::traces
pub fn parse_catalog(channel: u32, reply: &str) -> InstrumentResult<Vec<TraceInfo>> {
    let text = codec::parse_text(reply);
    if text.is_empty() || text.eq_ignore_ascii_case("NO CATALOG") {
        return Ok(Vec::new());
    }

    let items: Vec<&str> = text.split(',').map(str::trim).collect();
    if items.len() % 2 != 0 {
        return Err(InstrumentError::Protocol(format!(
            "catalog of channel {} has an odd number of items: '{}'",
            channel, text
        )));
    }

    Ok(items
        .chunks_exact(2)
        .zip(1..)
        .map(|(entry, position)| {
            let name = entry[0];
            TraceInfo {
                channel,
                number: suffix_number(name).unwrap_or(position),
                name: name.to_string(),
                parameter: entry[1].to_string(),
            }
        })
        .collect())
}

fn suffix_number(name: &str) -> Option<u32> {
    name.rsplit_once('_')
        .and_then(|(_, suffix)| suffix.parse().ok())
}

/// Name given to traces created by this driver: `CH{ch}_{param}_{n}`.
pub fn trace_name(channel: u32, parameter: &str, number: u32) -> String {
    format!("CH{}_{}_{}", channel, parameter, number)
}

pub(crate) async fn channel_catalog(
    transport: &SharedTransport,
    channel: u32,
) -> InstrumentResult<Vec<TraceInfo>> {
    let reply = transport
        .ask(&format!("CALC{}:PAR:CAT:EXT?", channel))
        .await?;
    let mut traces = parse_catalog(channel, &reply)?;

    if traces.iter().any(|t| suffix_number(&t.name).is_none()) {
        match measurement_numbers(transport, channel).await {
            Ok(numbers) => {
                for trace in &mut traces {
                    if let Some((number, _)) = numbers.iter().find(|(_, name)| *name == trace.name)
                    {
                        trace.number = *number;
                    }
                }
            }
            Err(e) => warn!(
                channel,
                error = %e,
                "Could not look up measurement numbers; using catalog positions"
            ),
        }
    }
    Ok(traces)
}

/// `(number, name)` of every measurement on `channel`.
async fn measurement_numbers(
    transport: &SharedTransport,
    channel: u32,
) -> InstrumentResult<Vec<(u32, String)>> {
    let reply = transport
        .ask(&format!("SYST:MEAS:CAT? {}", channel))
        .await?;
    let mut numbers = Vec::new();
    for item in codec::parse_text(&reply).split(',').map(str::trim) {
        if item.is_empty() {
            continue;
        }
        let number: u32 = item.parse().map_err(|_| {
            InstrumentError::Protocol(format!("invalid measurement number '{}'", item))
        })?;
        let name = transport
            .ask(&format!("SYST:MEAS{}:NAME?", number))
            .await?;
        numbers.push((number, codec::parse_text(&name)));
    }
    Ok(numbers)
}

/// Handle to trace `number` of `channel`.
#[derive(Clone)]
pub struct Trace {
    transport: SharedTransport,
    channel: u32,
    number: u32,
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("channel", &self.channel)
            .field("number", &self.number)
            .finish()
    }
}

impl Trace {
    pub fn new(transport: SharedTransport, channel: u32, number: u32) -> Self {
        Self {
            transport,
            channel,
            number,
        }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    fn measurement(&self, suffix: &str) -> String {
        format!("CALC{}:MEAS{}:{}", self.channel, self.number, suffix)
    }

    /// Look the trace up in its channel catalog.
    pub async fn info(&self) -> InstrumentResult<Option<TraceInfo>> {
        let catalog = channel_catalog(&self.transport, self.channel).await?;
        Ok(catalog.into_iter().find(|t| t.number == self.number))
    }

    /// Whether the trace is currently defined on the analyzer.
    pub async fn exists(&self) -> InstrumentResult<bool> {
        Ok(self.info().await?.is_some())
    }

    /// Stimulus values, or `None` if the trace does not exist.
    pub async fn frequencies(&self) -> InstrumentResult<Option<Vec<f64>>> {
        if !self.exists().await? {
            debug!(channel = self.channel, trace = self.number, "Trace not available");
            return Ok(None);
        }
        let reply = self.transport.ask(&self.measurement("X?")).await?;
        codec::parse_float_list(&reply).map(Some)
    }

    /// Complex S-parameter data, or `None` if the trace does not exist.
    pub async fn data(&self) -> InstrumentResult<Option<ComplexTrace>> {
        if !self.exists().await? {
            debug!(channel = self.channel, trace = self.number, "Trace not available");
            return Ok(None);
        }
        let reply = self.transport.ask(&self.measurement("DATA:SDATA?")).await?;
        codec::decode_complex(&reply, PairEncoding::RealImag).map(Some)
    }

    /// Measured quantity, or `None` if the trace does not exist.
    pub async fn s_parameter(&self) -> InstrumentResult<Option<String>> {
        if !self.exists().await? {
            return Ok(None);
        }
        let reply = self.transport.ask(&self.measurement("PAR?")).await?;
        Ok(Some(codec::parse_text(&reply)))
    }

    /// Change the measured quantity of an existing trace.
    pub async fn set_s_parameter(&self, parameter: &str) -> InstrumentResult<()> {
        Domain::choices(S_PARAMETERS).check("s_parameter", &parameter.into())?;
        if !self.exists().await? {
            return Err(InstrumentError::Unsupported(format!(
                "trace {} of channel {} does not exist",
                self.number, self.channel
            )));
        }
        self.transport
            .write(&format!("{} {}", self.measurement("PAR"), parameter))
            .await
    }
}
