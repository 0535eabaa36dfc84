//! Channel-1 parameter table shared by the Keysight network analyzers.
//!
//! Both the ENA E5071C and the P9374A speak the same SCPI subset for the
//! sweep, source and averaging settings. They differ only in which display
//! formats `trform` accepts.

use std::sync::Arc;
use tfe_core::parameter::{Domain, Parameter};
use tfe_core::registry::ParameterSet;
use tfe_core::transport::SharedTransport;

/// Highest point count of a single sweep.
pub const MAX_POINTS: i64 = 1601;

/// Source power range in dBm.
pub const POWER_MIN_DBM: f64 = -85.0;
pub const POWER_MAX_DBM: f64 = 10.0;

pub const TRIGGER_SOURCES: &[&str] = &["INT", "EXT", "MAN", "BUS"];
pub const MATH_FUNCTIONS: &[&str] = &["ADD", "SUBT", "DIV", "MULT", "NORM"];
pub const SWEEP_TYPES: &[&str] = &["LIN", "LOG", "SEGM", "POW"];

const ENA_FORMATS: &[&str] = &[
    "PLOG", "MLOG", "PHAS", "GDEL", "SLIN", "SLOG", "SCOM", "SMIT", "SADM", "PLIN", "POL", "MLIN",
    "SWR", "REAL", "IMAG", "UPH", "PPH",
];

const P9374A_FORMATS: &[&str] = &[
    "MLOG", "PHAS", "GDEL", "SCOM", "SMIT", "SADM", "POL", "MLIN", "SWR", "REAL", "IMAG", "UPH",
    "PPH", "SLIN", "SLOG",
];

/// Analyzer family, used to select model-specific choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnaModel {
    EnaE5071c,
    P9374a,
}

impl VnaModel {
    /// Display formats accepted by `:CALC1:FORM`.
    pub fn trace_formats(self) -> &'static [&'static str] {
        match self {
            VnaModel::EnaE5071c => ENA_FORMATS,
            VnaModel::P9374a => P9374A_FORMATS,
        }
    }
}

/// Typed handles to every channel-1 parameter.
#[derive(Debug, Clone)]
pub struct VnaParameters {
    pub fstart: Arc<Parameter<f64>>,
    pub fstop: Arc<Parameter<f64>>,
    pub fcenter: Arc<Parameter<f64>>,
    pub fspan: Arc<Parameter<f64>>,
    pub rfout: Arc<Parameter<i64>>,
    pub num_points: Arc<Parameter<i64>>,
    pub ifbw: Arc<Parameter<f64>>,
    pub power: Arc<Parameter<f64>>,
    pub power_start: Arc<Parameter<f64>>,
    pub power_stop: Arc<Parameter<f64>>,
    pub averaging: Arc<Parameter<i64>>,
    pub average_trigger: Arc<Parameter<i64>>,
    pub avgnum: Arc<Parameter<i64>>,
    pub phase_offset: Arc<Parameter<f64>>,
    pub electrical_delay: Arc<Parameter<f64>>,
    pub trigger_source: Arc<Parameter<String>>,
    pub trform: Arc<Parameter<String>>,
    pub math: Arc<Parameter<String>>,
    pub sweep_type: Arc<Parameter<String>>,
    pub correction: Arc<Parameter<i64>>,
    pub smoothing: Arc<Parameter<f64>>,
    pub sweep_time: Arc<Parameter<f64>>,
}

fn frequency(transport: &SharedTransport, name: &str, label: &str, header: &str) -> Parameter<f64> {
    Parameter::new(name)
        .with_label(label)
        .with_unit("Hz")
        .with_domain(Domain::real())
        .bind_scpi(transport, format!("{}?", header), format!("{} {{}}", header))
}

fn source_power(transport: &SharedTransport, name: &str, label: &str, get: &str, set: &str) -> Parameter<f64> {
    Parameter::new(name)
        .with_label(label)
        .with_unit("dBm")
        .with_domain(Domain::numbers(POWER_MIN_DBM, POWER_MAX_DBM))
        .bind_scpi(transport, get, set)
}

fn switch(transport: &SharedTransport, name: &str, label: &str, header: &str) -> Parameter<i64> {
    Parameter::new(name)
        .with_label(label)
        .with_domain(Domain::ints(0, 1))
        .bind_scpi(transport, format!("{}?", header), format!("{} {{}}", header))
}

fn choice(transport: &SharedTransport, name: &str, header: &str, choices: &[&str]) -> Parameter<String> {
    Parameter::new(name)
        .with_domain(Domain::choices(choices))
        .bind_scpi(transport, format!("{}?", header), format!("{} {{}}", header))
}

impl VnaParameters {
    /// Bind the whole table to `transport`.
    pub fn new(transport: &SharedTransport, model: VnaModel) -> Self {
        Self {
            fstart: Arc::new(frequency(transport, "fstart", "Start Frequency", ":SENS1:FREQ:STAR")),
            fstop: Arc::new(frequency(transport, "fstop", "Stop Frequency", ":SENS1:FREQ:STOP")),
            fcenter: Arc::new(frequency(transport, "fcenter", "Center Frequency", ":SENS1:FREQ:CENT")),
            fspan: Arc::new(frequency(transport, "fspan", "Frequency Span", ":SENS1:FREQ:SPAN")),
            rfout: Arc::new(switch(transport, "rfout", "RF Output", ":OUTP")),
            num_points: Arc::new(
                Parameter::new("num_points")
                    .with_label("Number of Points")
                    .with_domain(Domain::ints(1, MAX_POINTS))
                    .bind_scpi(transport, ":SENS1:SWE:POIN?", ":SENS1:SWE:POIN {}"),
            ),
            ifbw: Arc::new(
                Parameter::new("ifbw")
                    .with_label("IF Bandwidth")
                    .with_unit("Hz")
                    .with_domain(Domain::numbers(10.0, 1.5e6))
                    .bind_scpi(transport, ":SENS1:BWID?", ":SENS1:BWID {}"),
            ),
            power: Arc::new(source_power(transport, "power", "Power", ":SOUR1:POW?", ":SOUR1:POW {}")),
            power_start: Arc::new(source_power(
                transport,
                "power_start",
                "Power Start",
                ":SOUR1:POW:STAR?",
                ":SOUR1:POW:STAR {}",
            )),
            // The instrument answers the stop query without the channel suffix
            power_stop: Arc::new(source_power(
                transport,
                "power_stop",
                "Power Stop",
                ":SOUR:POW:STOP?",
                ":SOUR1:POW:STOP {}",
            )),
            averaging: Arc::new(switch(transport, "averaging", "Averaging", ":SENS1:AVER")),
            average_trigger: Arc::new(switch(transport, "average_trigger", "Average Trigger", ":TRIG:AVER")),
            avgnum: Arc::new(
                Parameter::new("avgnum")
                    .with_label("Number of Averages")
                    .with_domain(Domain::ints_from(1))
                    .bind_scpi(transport, ":SENS1:AVER:COUN?", ":SENS1:AVER:COUN {}"),
            ),
            phase_offset: Arc::new(
                Parameter::new("phase_offset")
                    .with_label("Phase Offset")
                    .with_unit("deg")
                    .with_domain(Domain::real())
                    .bind_scpi(transport, ":CALC1:CORR:OFFS:PHAS?", ":CALC1:CORR:OFFS:PHAS {}"),
            ),
            electrical_delay: Arc::new(
                Parameter::new("electrical_delay")
                    .with_label("Electrical Delay")
                    .with_unit("s")
                    .with_domain(Domain::real())
                    .bind_scpi(transport, "CALC1:CORR:EDEL:TIME?", "CALC1:CORR:EDEL:TIME {}"),
            ),
            trigger_source: Arc::new(choice(transport, "trigger_source", "TRIG:SOUR", TRIGGER_SOURCES)),
            trform: Arc::new(choice(transport, "trform", ":CALC1:FORM", model.trace_formats())),
            math: Arc::new(choice(transport, "math", ":CALC1:MATH:FUNC", MATH_FUNCTIONS)),
            sweep_type: Arc::new(choice(transport, "sweep_type", ":SENS1:SWE:TYPE", SWEEP_TYPES)),
            correction: Arc::new(
                Parameter::new("correction")
                    .with_label("Error Correction")
                    .bind_scpi(transport, ":SENS1:CORR:STAT?", ":SENS1:CORR:STAT {}"),
            ),
            smoothing: Arc::new(
                Parameter::new("smoothing")
                    .with_label("Smoothing")
                    .bind_scpi(transport, ":CALC1:SMO:STAT?", ":CALC1:SMO:STAT {}"),
            ),
            sweep_time: Arc::new(
                Parameter::new("sweep_time")
                    .with_label("Sweep Time")
                    .with_unit("s")
                    .scpi_query(transport, ":SENS1:SWE:TIME?"),
            ),
        }
    }

    /// Build the name → parameter registry.
    pub fn registry(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        set.register(Arc::clone(&self.fstart));
        set.register(Arc::clone(&self.fstop));
        set.register(Arc::clone(&self.fcenter));
        set.register(Arc::clone(&self.fspan));
        set.register(Arc::clone(&self.rfout));
        set.register(Arc::clone(&self.num_points));
        set.register(Arc::clone(&self.ifbw));
        set.register(Arc::clone(&self.power));
        set.register(Arc::clone(&self.power_start));
        set.register(Arc::clone(&self.power_stop));
        set.register(Arc::clone(&self.averaging));
        set.register(Arc::clone(&self.average_trigger));
        set.register(Arc::clone(&self.avgnum));
        set.register(Arc::clone(&self.phase_offset));
        set.register(Arc::clone(&self.electrical_delay));
        set.register(Arc::clone(&self.trigger_source));
        set.register(Arc::clone(&self.trform));
        set.register(Arc::clone(&self.math));
        set.register(Arc::clone(&self.sweep_type));
        set.register(Arc::clone(&self.correction));
        set.register(Arc::clone(&self.smoothing));
        set.register(Arc::clone(&self.sweep_time));
        set
    }
}
