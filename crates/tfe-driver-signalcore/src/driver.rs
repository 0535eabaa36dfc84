//! SignalCore SC5511A RF Generator Driver
//!
//! # Parameters
//!
//! - `power` - RF1 level, -144..19 dBm
//! - `output_status` - RF1 output off (0) / on (1)
//! - `frequency` - RF1 frequency, 0..20 GHz
//! - `reference_source` - 1 locks to the external 10 MHz reference
//! - `auto_level_disable` - 0 re-levels the output power on every frequency
//!   change (the library flag is the inverse, `auto_pwr_disable`)
//! - `temperature` (read-only) - device temperature, °C
//!
//! Each parameter access opens a handle, makes one library call and closes
//! the handle, unless the session is held open for a batch.

use crate::library::{DeviceHandle, Sc5511aLibrary};
use crate::records::{
    decode_temperature, DeviceInfo, DeviceStatus, ManufactureDate, RfParameters,
    DEVICE_INFO_SIZE, DEVICE_STATUS_SIZE, RF_PARAMETERS_SIZE, TEMPERATURE_SIZE,
};
use crate::session::DeviceSession;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use tfe_core::codec::Identity;
use tfe_core::error::InstrumentResult;
use tfe_core::parameter::{Domain, ParamValue, Parameter};
use tfe_core::registry::{Bundle, ParameterSet};
use tracing::{info, instrument, warn};

pub const VENDOR: &str = "SignalCore";
pub const MODEL: &str = "SC5511A";

/// Identification of an SC5511A.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sc5511aIdentity {
    pub vendor: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: f32,
    pub hardware_revision: f32,
    pub manufacture_date: ManufactureDate,
}

impl From<&Sc5511aIdentity> for Identity {
    fn from(id: &Sc5511aIdentity) -> Self {
        Identity {
            vendor: id.vendor.clone(),
            model: id.model.clone(),
            serial: id.serial_number.clone(),
            firmware: id.firmware_revision.to_string(),
        }
    }
}

// =============================================================================
// Record reads
// =============================================================================

async fn read_rf_parameters(session: Arc<DeviceSession>) -> InstrumentResult<RfParameters> {
    DeviceSession::call(&session, |lib, handle| {
        let mut buf = [0u8; RF_PARAMETERS_SIZE];
        lib.get_rf_parameters(handle, &mut buf)?;
        RfParameters::decode(&buf)
    })
    .await
}

async fn read_device_status(session: Arc<DeviceSession>) -> InstrumentResult<DeviceStatus> {
    DeviceSession::call(&session, |lib, handle| {
        let mut buf = [0u8; DEVICE_STATUS_SIZE];
        lib.get_device_status(handle, &mut buf)?;
        DeviceStatus::decode(&buf)
    })
    .await
}

async fn read_device_info(session: Arc<DeviceSession>) -> InstrumentResult<DeviceInfo> {
    DeviceSession::call(&session, |lib, handle| {
        let mut buf = [0u8; DEVICE_INFO_SIZE];
        lib.get_device_info(handle, &mut buf)?;
        DeviceInfo::decode(&buf)
    })
    .await
}

async fn read_temperature(session: Arc<DeviceSession>) -> InstrumentResult<f32> {
    DeviceSession::call(&session, |lib, handle| {
        let mut buf = [0u8; TEMPERATURE_SIZE];
        lib.get_temperature(handle, &mut buf)?;
        decode_temperature(&buf)
    })
    .await
}

// =============================================================================
// Parameter binding
// =============================================================================

/// Bind a read to one field of the RF parameter record.
fn rf_field<T: ParamValue>(
    session: &Arc<DeviceSession>,
    field: fn(&RfParameters) -> T,
) -> impl Fn() -> BoxFuture<'static, InstrumentResult<T>> + Send + Sync + 'static {
    let session = Arc::clone(session);
    move || {
        let session = Arc::clone(&session);
        Box::pin(async move { read_rf_parameters(session).await.map(|rf| field(&rf)) })
    }
}

/// Bind a read to one field of the device status record.
fn status_field<T: ParamValue>(
    session: &Arc<DeviceSession>,
    field: fn(&DeviceStatus) -> T,
) -> impl Fn() -> BoxFuture<'static, InstrumentResult<T>> + Send + Sync + 'static {
    let session = Arc::clone(session);
    move || {
        let session = Arc::clone(&session);
        Box::pin(async move { read_device_status(session).await.map(|st| field(&st)) })
    }
}

/// Bind a write to one library setter.
fn setter<T: ParamValue>(
    session: &Arc<DeviceSession>,
    call: fn(&dyn Sc5511aLibrary, DeviceHandle, T) -> InstrumentResult<()>,
) -> impl Fn(T) -> BoxFuture<'static, InstrumentResult<()>> + Send + Sync + 'static {
    let session = Arc::clone(session);
    move |value: T| {
        let session = Arc::clone(&session);
        Box::pin(async move {
            DeviceSession::call(&session, move |lib, handle| call(lib, handle, value)).await
        })
    }
}

/// Typed handles to the generator parameters.
#[derive(Debug, Clone)]
pub struct GeneratorParameters {
    pub power: Arc<Parameter<f64>>,
    pub output_status: Arc<Parameter<i64>>,
    pub frequency: Arc<Parameter<f64>>,
    pub reference_source: Arc<Parameter<i64>>,
    pub auto_level_disable: Arc<Parameter<i64>>,
    pub temperature: Arc<Parameter<f64>>,
}

impl GeneratorParameters {
    fn bind(session: &Arc<DeviceSession>) -> Self {
        let temperature_session = Arc::clone(session);

        Self {
            power: Arc::new(
                Parameter::new("power")
                    .with_label("Output power")
                    .with_unit("dBm")
                    .with_domain(Domain::numbers(-144.0, 19.0))
                    .with_hardware_read(rf_field(session, |rf| f64::from(rf.rf_level)))
                    .with_hardware_write(setter(session, |lib, handle, level: f64| {
                        lib.set_level(handle, level as f32)
                    })),
            ),
            output_status: Arc::new(
                Parameter::new("output_status")
                    .with_domain(Domain::ints(0, 1))
                    .with_hardware_read(status_field(session, |st| {
                        i64::from(st.operate.rf1_out_enable)
                    }))
                    .with_hardware_write(setter(session, |lib, handle, enable: i64| {
                        lib.set_output(handle, enable as u8)
                    })),
            ),
            frequency: Arc::new(
                Parameter::new("frequency")
                    .with_unit("Hz")
                    .with_domain(Domain::numbers(0.0, 20e9))
                    .with_hardware_read(rf_field(session, |rf| rf.rf1_freq as f64))
                    .with_hardware_write(setter(session, |lib, handle, frequency: f64| {
                        lib.set_freq(handle, frequency.round() as u64)
                    })),
            ),
            reference_source: Arc::new(
                Parameter::new("reference_source")
                    .with_description("1 locks to the external reference")
                    .with_domain(Domain::ints(0, 1))
                    .with_hardware_read(status_field(session, |st| {
                        i64::from(st.operate.ext_ref_lock_enable)
                    }))
                    .with_hardware_write(setter(session, |lib, handle, lock: i64| {
                        lib.set_clock_reference(handle, 0, lock as u8)
                    })),
            ),
            auto_level_disable: Arc::new(
                Parameter::new("auto_level_disable")
                    .with_description("0 levels the output power on frequency change")
                    .with_domain(Domain::ints(0, 1))
                    .with_hardware_read(status_field(session, |st| {
                        i64::from(st.operate.auto_pwr_disable == 0)
                    }))
                    .with_hardware_write(setter(session, |lib, handle, disable: i64| {
                        lib.set_auto_level_disable(handle, u8::from(disable == 0))
                    })),
            ),
            temperature: Arc::new(
                Parameter::new("temperature")
                    .with_unit("C")
                    .with_hardware_read(move || {
                        let session = Arc::clone(&temperature_session);
                        Box::pin(async move { read_temperature(session).await.map(f64::from) })
                    }),
            ),
        }
    }

    fn registry(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        set.register(Arc::clone(&self.power));
        set.register(Arc::clone(&self.output_status));
        set.register(Arc::clone(&self.frequency));
        set.register(Arc::clone(&self.reference_source));
        set.register(Arc::clone(&self.auto_level_disable));
        set.register(Arc::clone(&self.temperature));
        set
    }
}

// =============================================================================
// Sc5511a
// =============================================================================

/// SignalCore SC5511A RF generator.
pub struct Sc5511a {
    name: String,
    session: Arc<DeviceSession>,
    params: GeneratorParameters,
    registry: ParameterSet,
}

impl std::fmt::Debug for Sc5511a {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sc5511a")
            .field("name", &self.name)
            .field("session", &self.session)
            .finish()
    }
}

impl Sc5511a {
    /// Open the generator with serial number `serial` through `library`.
    ///
    /// Identifies the device, enables automatic power leveling and switches
    /// to the external reference when external lock is disabled.
    #[instrument(skip(library), err)]
    pub async fn open(
        name: &str,
        serial: &str,
        library: Arc<dyn Sc5511aLibrary>,
    ) -> InstrumentResult<Self> {
        let session = Arc::new(DeviceSession::new(serial, library));
        let params = GeneratorParameters::bind(&session);
        let registry = params.registry();
        let generator = Self {
            name: name.to_string(),
            session,
            params,
            registry,
        };

        let identity = generator.identify().await?;
        info!(
            name = %generator.name,
            serial = %identity.serial_number,
            firmware = identity.firmware_revision,
            hardware = identity.hardware_revision,
            manufactured = %identity.manufacture_date,
            "Connected to {} {}",
            identity.vendor,
            identity.model
        );

        generator.params.auto_level_disable.set(0).await?;
        let status = generator.device_status().await?;
        if status.operate.ext_ref_lock_enable == 0 {
            generator.params.reference_source.set(1).await?;
        }
        Ok(generator)
    }

    /// Open through the vendor shared library.
    #[cfg(feature = "sc5511a_sdk")]
    pub async fn open_vendor(name: &str, serial: &str) -> InstrumentResult<Self> {
        Self::open(name, serial, Arc::new(crate::library::ffi::VendorLibrary)).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serial(&self) -> &str {
        self.session.serial()
    }

    pub fn parameters(&self) -> &GeneratorParameters {
        &self.params
    }

    pub fn registry(&self) -> &ParameterSet {
        &self.registry
    }

    /// Read the device info record.
    pub async fn identify(&self) -> InstrumentResult<Sc5511aIdentity> {
        let info = read_device_info(Arc::clone(&self.session)).await?;
        Ok(Sc5511aIdentity {
            vendor: VENDOR.to_string(),
            model: MODEL.to_string(),
            serial_number: format!("{:08X}", info.serial_number),
            firmware_revision: info.firmware_revision,
            hardware_revision: info.hardware_revision,
            manufacture_date: info.manufacture_date,
        })
    }

    pub async fn device_status(&self) -> InstrumentResult<DeviceStatus> {
        read_device_status(Arc::clone(&self.session)).await
    }

    pub async fn rf_parameters(&self) -> InstrumentResult<RfParameters> {
        read_rf_parameters(Arc::clone(&self.session)).await
    }

    pub async fn temperature(&self) -> InstrumentResult<f32> {
        read_temperature(Arc::clone(&self.session)).await
    }

    /// Keep one handle open until [`release`](Self::release).
    pub fn hold_open(&mut self) -> InstrumentResult<()> {
        self.session.hold_open()
    }

    pub fn release(&mut self) -> InstrumentResult<()> {
        self.session.release()
    }

    /// Apply a bundle of settings over one held handle.
    #[instrument(skip(self, bundle), fields(name = %self.name), err)]
    pub async fn apply_bundle(&mut self, bundle: &Bundle) -> InstrumentResult<()> {
        let was_held = self.session.is_held();
        self.session.hold_open()?;
        let result = self.registry.apply_bundle(bundle).await;
        if was_held {
            return result;
        }

        match (result, self.session.release()) {
            (Ok(()), released) => released,
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(error = %release_err, "Failed to release SC5511A handle after bundle error");
                Err(err)
            }
        }
    }

    pub async fn read_bundle<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> InstrumentResult<Bundle> {
        self.registry.read_bundle(names).await
    }
}
