//! AD5760 Precision Source Driver
//!
//! # Parameters
//!
//! - `voltage` - output voltage, -10..10 V
//! - `current` - output current, -0.1..0.1 A, derived as voltage / 100
//!   through the board's 100 Ω sense resistor
//! - `output` - `"on"` / `"off"`, the output-ground clamp of the control
//!   register
//!
//! # Example
//!
//! ```rust,ignore
//! let mut source = Ad5760::connect("coil", "localhost:2357", r"\System\Subsystem_1\EVAL-AD5760SDZ\AD5760", timeout, "\n").await?;
//! source.ramp_current(0.02, 0.001, Duration::from_millis(50)).await?;
//! ```

use crate::client::{read_code, AceBridgeClient, RegisterClient};
use crate::conversion::{
    code_to_voltage, control_word, voltage_to_code, CONTROL_REGISTER, DATA_REGISTER, OPGND_BIT,
};
use std::sync::Arc;
use std::time::Duration;
use tfe_core::error::InstrumentResult;
use tfe_core::parameter::{Domain, Parameter};
use tfe_core::ramp::run_ramp;
use tfe_core::registry::{Bundle, ParameterSet};
use tracing::{info, instrument};

/// Volts per amp of output current.
pub const SENSE_RESISTANCE: f64 = 100.0;

/// Typed handles to the source parameters.
#[derive(Debug, Clone)]
pub struct SourceParameters {
    pub voltage: Arc<Parameter<f64>>,
    pub current: Arc<Parameter<f64>>,
    pub output: Arc<Parameter<String>>,
}

impl SourceParameters {
    fn bind(client: &Arc<dyn RegisterClient>) -> Self {
        let read_client = Arc::clone(client);
        let write_client = Arc::clone(client);
        let voltage = Arc::new(
            Parameter::new("voltage")
                .with_label("Voltage")
                .with_unit("V")
                .with_domain(Domain::numbers(-10.0, 10.0))
                .with_hardware_read(move || {
                    let client = Arc::clone(&read_client);
                    Box::pin(async move {
                        let code = read_code(client.as_ref(), DATA_REGISTER).await?;
                        Ok(code_to_voltage(code))
                    })
                })
                .with_hardware_write(move |volts: f64| {
                    let client = Arc::clone(&write_client);
                    let code = voltage_to_code(volts).to_string();
                    Box::pin(async move { client.write_register(DATA_REGISTER, &code).await })
                }),
        );

        let read_voltage = Arc::clone(&voltage);
        let write_voltage = Arc::clone(&voltage);
        let current = Arc::new(
            Parameter::new("current")
                .with_label("Current")
                .with_unit("A")
                .with_domain(Domain::numbers(-0.1, 0.1))
                .with_hardware_read(move || {
                    let voltage = Arc::clone(&read_voltage);
                    Box::pin(async move { Ok(voltage.get().await? / SENSE_RESISTANCE) })
                })
                .with_hardware_write(move |amps: f64| {
                    let voltage = Arc::clone(&write_voltage);
                    Box::pin(async move { voltage.set(amps * SENSE_RESISTANCE).await })
                }),
        );

        let read_client = Arc::clone(client);
        let write_client = Arc::clone(client);
        let output = Arc::new(
            Parameter::new("output")
                .with_label("Output State")
                .with_domain(Domain::choices(&["off", "on"]))
                .with_hardware_read(move || {
                    let client = Arc::clone(&read_client);
                    Box::pin(async move {
                        let control = read_code(client.as_ref(), CONTROL_REGISTER).await?;
                        let state = if control & OPGND_BIT == 0 { "on" } else { "off" };
                        Ok(state.to_string())
                    })
                })
                .with_hardware_write(move |state: String| {
                    let client = Arc::clone(&write_client);
                    let word = control_word(state == "on").to_string();
                    Box::pin(async move { client.write_register(CONTROL_REGISTER, &word).await })
                }),
        );

        Self {
            voltage,
            current,
            output,
        }
    }

    fn registry(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        set.register(Arc::clone(&self.voltage));
        set.register(Arc::clone(&self.current));
        set.register(Arc::clone(&self.output));
        set
    }
}

/// AD5760 evaluation board as a bipolar voltage/current source.
pub struct Ad5760 {
    name: String,
    client: Arc<dyn RegisterClient>,
    params: SourceParameters,
    registry: ParameterSet,
}

impl std::fmt::Debug for Ad5760 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ad5760").field("name", &self.name).finish()
    }
}

impl Ad5760 {
    /// Connect through the ACE bridge at `address` and select the board at
    /// `context_path`.
    pub async fn connect(
        name: &str,
        address: &str,
        context_path: &str,
        timeout: Duration,
        terminator: &str,
    ) -> InstrumentResult<Self> {
        info!(name, address, context_path, "Connecting to AD5760");
        let client = AceBridgeClient::connect(address, context_path, timeout, terminator).await?;
        Self::with_client(name, Arc::new(client)).await
    }

    /// Build the driver on a register client and enable the output.
    pub async fn with_client(name: &str, client: Arc<dyn RegisterClient>) -> InstrumentResult<Self> {
        client
            .write_register(CONTROL_REGISTER, &control_word(true).to_string())
            .await?;

        let params = SourceParameters::bind(&client);
        let registry = params.registry();
        Ok(Self {
            name: name.to_string(),
            client,
            params,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &SourceParameters {
        &self.params
    }

    pub fn registry(&self) -> &ParameterSet {
        &self.registry
    }

    pub fn client(&self) -> &Arc<dyn RegisterClient> {
        &self.client
    }

    pub async fn on(&self) -> InstrumentResult<()> {
        self.params.output.set("on".to_string()).await
    }

    pub async fn off(&self) -> InstrumentResult<()> {
        self.params.output.set("off".to_string()).await
    }

    /// Step the voltage to `target` in increments of `step` volts, pausing
    /// `delay` between writes. Returns the number of writes.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn ramp_voltage(
        &mut self,
        target: f64,
        step: f64,
        delay: Duration,
    ) -> InstrumentResult<usize> {
        run_ramp(&self.params.voltage, target, step, delay).await
    }

    /// Step the current to `target` in increments of `step` amps.
    #[instrument(skip(self), fields(name = %self.name), err)]
    pub async fn ramp_current(
        &mut self,
        target: f64,
        step: f64,
        delay: Duration,
    ) -> InstrumentResult<usize> {
        run_ramp(&self.params.current, target, step, delay).await
    }

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
