//! Access to the SC5511A vendor library.
//!
//! [`Sc5511aLibrary`] mirrors the C API: a device is opened by serial number,
//! addressed through an opaque handle, and closed again. Setters pass plain
//! values; getters fill a caller-provided buffer with one of the structs
//! decoded in [`crate::records`].
//!
//! Calls are blocking. The driver runs them on the tokio blocking pool.

use crate::records::{
    DeviceInfo, DeviceStatus, ManufactureDate, RfParameters, DEVICE_INFO_SIZE,
    DEVICE_STATUS_SIZE, RF_PARAMETERS_SIZE, TEMPERATURE_SIZE,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use tfe_core::error::{InstrumentError, InstrumentResult};

/// Opaque device handle returned by `open_device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub usize);

/// Blocking call-and-fill interface of the vendor library.
pub trait Sc5511aLibrary: Send + Sync {
    fn open_device(&self, serial: &str) -> InstrumentResult<DeviceHandle>;

    fn close_device(&self, handle: DeviceHandle) -> InstrumentResult<()>;

    /// RF1 output on (1) or off (0).
    fn set_output(&self, handle: DeviceHandle, enable: u8) -> InstrumentResult<()>;

    /// RF1 frequency in Hz.
    fn set_freq(&self, handle: DeviceHandle, frequency: u64) -> InstrumentResult<()>;

    /// `high` selects the 100 MHz reference output; `lock_external` locks to
    /// the external reference input.
    fn set_clock_reference(
        &self,
        handle: DeviceHandle,
        high: u8,
        lock_external: u8,
    ) -> InstrumentResult<()>;

    /// RF1 level in dBm.
    fn set_level(&self, handle: DeviceHandle, level: f32) -> InstrumentResult<()>;

    /// 1 disables power leveling on frequency changes.
    fn set_auto_level_disable(&self, handle: DeviceHandle, disable: u8) -> InstrumentResult<()>;

    fn get_rf_parameters(
        &self,
        handle: DeviceHandle,
        out: &mut [u8; RF_PARAMETERS_SIZE],
    ) -> InstrumentResult<()>;

    fn get_device_status(
        &self,
        handle: DeviceHandle,
        out: &mut [u8; DEVICE_STATUS_SIZE],
    ) -> InstrumentResult<()>;

    fn get_temperature(
        &self,
        handle: DeviceHandle,
        out: &mut [u8; TEMPERATURE_SIZE],
    ) -> InstrumentResult<()>;

    fn get_device_info(
        &self,
        handle: DeviceHandle,
        out: &mut [u8; DEVICE_INFO_SIZE],
    ) -> InstrumentResult<()>;
}

/// Map a non-zero library status code to a transport error.
pub(crate) fn check_status(call: &str, code: i32) -> InstrumentResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(InstrumentError::Transport(format!(
            "{} failed with status {}",
            call, code
        )))
    }
}

// =============================================================================
// Vendor library
// =============================================================================

#[cfg(feature = "sc5511a_sdk")]
pub mod ffi {
    //! Bindings to `libsc5511a` / `sc5511a.dll`.

    use super::{check_status, DeviceHandle, Sc5511aLibrary};
    use crate::records::{DEVICE_INFO_SIZE, DEVICE_STATUS_SIZE, RF_PARAMETERS_SIZE, TEMPERATURE_SIZE};
    use std::ffi::{c_char, c_int, c_void, CString};
    use tfe_core::error::{InstrumentError, InstrumentResult};

    #[link(name = "sc5511a")]
    extern "C" {
        fn sc5511a_open_device(serial: *const c_char) -> *mut c_void;
        fn sc5511a_close_device(handle: *mut c_void) -> c_int;
        fn sc5511a_set_output(handle: *mut c_void, enable: u8) -> c_int;
        fn sc5511a_set_freq(handle: *mut c_void, frequency: u64) -> c_int;
        fn sc5511a_set_clock_reference(handle: *mut c_void, high: u8, lock: u8) -> c_int;
        fn sc5511a_set_level(handle: *mut c_void, level: f32) -> c_int;
        fn sc5511a_set_auto_level_disable(handle: *mut c_void, disable: u8) -> c_int;
        fn sc5511a_get_rf_parameters(handle: *mut c_void, out: *mut u8) -> c_int;
        fn sc5511a_get_device_status(handle: *mut c_void, out: *mut u8) -> c_int;
        fn sc5511a_get_temperature(handle: *mut c_void, out: *mut u8) -> c_int;
        fn sc5511a_get_device_info(handle: *mut c_void, out: *mut u8) -> c_int;
    }

    fn raw(handle: DeviceHandle) -> *mut c_void {
        handle.0 as *mut c_void
    }

    /// The installed vendor library.
    #[derive(Debug, Default)]
    pub struct VendorLibrary;

    impl Sc5511aLibrary for VendorLibrary {
        fn open_device(&self, serial: &str) -> InstrumentResult<DeviceHandle> {
            let serial_c = CString::new(serial)
                .map_err(|e| InstrumentError::Config(format!("invalid serial number: {}", e)))?;
            // SAFETY: serial_c is a valid NUL-terminated string for the call
            let handle = unsafe { sc5511a_open_device(serial_c.as_ptr()) };
            if handle.is_null() {
                return Err(InstrumentError::Transport(format!(
                    "no SC5511A with serial number {}",
                    serial
                )));
            }
            Ok(DeviceHandle(handle as usize))
        }

        fn close_device(&self, handle: DeviceHandle) -> InstrumentResult<()> {
            // SAFETY: handle came from sc5511a_open_device and is closed once
            check_status("sc5511a_close_device", unsafe { sc5511a_close_device(raw(handle)) })
        }

        fn set_output(&self, handle: DeviceHandle, enable: u8) -> InstrumentResult<()> {
            // SAFETY: handle is open for the duration of the call
            check_status("sc5511a_set_output", unsafe { sc5511a_set_output(raw(handle), enable) })
        }

        fn set_freq(&self, handle: DeviceHandle, frequency: u64) -> InstrumentResult<()> {
            // SAFETY: handle is open for the duration of the call
            check_status("sc5511a_set_freq", unsafe { sc5511a_set_freq(raw(handle), frequency) })
        }

        fn set_clock_reference(
            &self,
            handle: DeviceHandle,
            high: u8,
            lock_external: u8,
        ) -> InstrumentResult<()> {
            // SAFETY: handle is open for the duration of the call
            check_status("sc5511a_set_clock_reference", unsafe {
                sc5511a_set_clock_reference(raw(handle), high, lock_external)
            })
        }

        fn set_level(&self, handle: DeviceHandle, level: f32) -> InstrumentResult<()> {
            // SAFETY: handle is open for the duration of the call
            check_status("sc5511a_set_level", unsafe { sc5511a_set_level(raw(handle), level) })
        }

        fn set_auto_level_disable(&self, handle: DeviceHandle, disable: u8) -> InstrumentResult<()> {
            // SAFETY: handle is open for the duration of the call
            check_status("sc5511a_set_auto_level_disable", unsafe {
                sc5511a_set_auto_level_disable(raw(handle), disable)
            })
        }

        fn get_rf_parameters(
            &self,
            handle: DeviceHandle,
            out: &mut [u8; RF_PARAMETERS_SIZE],
        ) -> InstrumentResult<()> {
            // SAFETY: out is exactly sizeof(device_rf_params_t)
            check_status("sc5511a_get_rf_parameters", unsafe {
                sc5511a_get_rf_parameters(raw(handle), out.as_mut_ptr())
            })
        }

        fn get_device_status(
            &self,
            handle: DeviceHandle,
            out: &mut [u8; DEVICE_STATUS_SIZE],
        ) -> InstrumentResult<()> {
            // SAFETY: out is exactly sizeof(device_status_t)
            check_status("sc5511a_get_device_status", unsafe {
                sc5511a_get_device_status(raw(handle), out.as_mut_ptr())
            })
        }

        fn get_temperature(
            &self,
            handle: DeviceHandle,
            out: &mut [u8; TEMPERATURE_SIZE],
        ) -> InstrumentResult<()> {
            // SAFETY: out is exactly sizeof(device_temperature_t)
            check_status("sc5511a_get_temperature", unsafe {
                sc5511a_get_temperature(raw(handle), out.as_mut_ptr())
            })
        }

        fn get_device_info(
            &self,
            handle: DeviceHandle,
            out: &mut [u8; DEVICE_INFO_SIZE],
        ) -> InstrumentResult<()> {
            // SAFETY: out is exactly sizeof(device_info_t)
            check_status("sc5511a_get_device_info", unsafe {
                sc5511a_get_device_info(raw(handle), out.as_mut_ptr())
            })
        }
    }
}

// =============================================================================
// Simulation
// =============================================================================

#[derive(Debug)]
struct SimulatedState {
    rf: RfParameters,
    status: DeviceStatus,
    info: DeviceInfo,
    temperature: f32,
    open_handles: HashSet<DeviceHandle>,
    next_handle: usize,
    opens: usize,
    closes: usize,
    failing_calls: HashSet<&'static str>,
}

/// In-memory SC5511A that behaves like the vendor library.
///
/// Setters update the records returned by the getters. Every call checks
/// that its handle is open, so use-after-close shows up as an error.
#[derive(Debug)]
pub struct SimulatedSc5511a {
    serial: String,
    state: Mutex<SimulatedState>,
}

impl SimulatedSc5511a {
    pub fn new(serial: &str) -> Self {
        let mut status = DeviceStatus::default();
        status.pll.sum_pll_ld = 1;
        Self {
            serial: serial.to_string(),
            state: Mutex::new(SimulatedState {
                rf: RfParameters {
                    rf1_freq: 5_000_000_000,
                    rf_level: -10.0,
                    ..RfParameters::default()
                },
                status,
                info: DeviceInfo {
                    serial_number: u32::from_str_radix(serial, 16).unwrap_or(0),
                    hardware_revision: 3.0,
                    firmware_revision: 4.2,
                    manufacture_date: ManufactureDate {
                        year: 2021,
                        month: 3,
                        day: 15,
                    },
                },
                temperature: 41.5,
                open_handles: HashSet::new(),
                next_handle: 1,
                opens: 0,
                closes: 0,
                failing_calls: HashSet::new(),
            }),
        }
    }

    /// Make every later call named `call` (e.g. `"set_freq"`,
    /// `"close_device"`) fail.
    pub fn fail_on(&self, call: &'static str) {
        self.state.lock().failing_calls.insert(call);
    }

    pub fn clear_failure(&self) {
        self.state.lock().failing_calls.clear();
    }

    /// Preset the external reference lock flag reported in the status.
    pub fn set_ext_ref_lock(&self, enabled: u8) {
        self.state.lock().status.operate.ext_ref_lock_enable = enabled;
    }

    pub fn set_temperature(&self, celsius: f32) {
        self.state.lock().temperature = celsius;
    }

    pub fn status(&self) -> DeviceStatus {
        self.state.lock().status
    }

    pub fn rf_parameters(&self) -> RfParameters {
        self.state.lock().rf
    }

    /// Handles currently open.
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles.len()
    }

    /// `(opens, closes)` since creation.
    pub fn handle_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.opens, state.closes)
    }

    fn with_open<R>(
        &self,
        call: &'static str,
        handle: DeviceHandle,
        f: impl FnOnce(&mut SimulatedState) -> R,
    ) -> InstrumentResult<R> {
        let mut state = self.state.lock();
        if !state.open_handles.contains(&handle) {
            return Err(InstrumentError::Transport(format!(
                "{} called with closed handle {:?}",
                call, handle
            )));
        }
        if state.failing_calls.contains(call) {
            check_status(call, -1)?;
        }
        Ok(f(&mut state))
    }
}

impl Sc5511aLibrary for SimulatedSc5511a {
    fn open_device(&self, serial: &str) -> InstrumentResult<DeviceHandle> {
        let mut state = self.state.lock();
        if serial != self.serial {
            return Err(InstrumentError::Transport(format!(
                "no SC5511A with serial number {}",
                serial
            )));
        }
        let handle = DeviceHandle(state.next_handle);
        state.next_handle += 1;
        state.opens += 1;
        state.open_handles.insert(handle);
        Ok(handle)
    }

    fn close_device(&self, handle: DeviceHandle) -> InstrumentResult<()> {
        let mut state = self.state.lock();
        if !state.open_handles.remove(&handle) {
            return Err(InstrumentError::Transport(format!(
                "handle {:?} closed twice",
                handle
            )));
        }
        state.closes += 1;
        if state.failing_calls.contains("close_device") {
            check_status("close_device", -1)?;
        }
        Ok(())
    }

    fn set_output(&self, handle: DeviceHandle, enable: u8) -> InstrumentResult<()> {
        self.with_open("set_output", handle, |s| s.status.operate.rf1_out_enable = enable)
    }

    fn set_freq(&self, handle: DeviceHandle, frequency: u64) -> InstrumentResult<()> {
        self.with_open("set_freq", handle, |s| s.rf.rf1_freq = frequency)
    }

    fn set_clock_reference(
        &self,
        handle: DeviceHandle,
        high: u8,
        lock_external: u8,
    ) -> InstrumentResult<()> {
        self.with_open("set_clock_reference", handle, |s| {
            s.status.operate.ref_out_select = high;
            s.status.operate.ext_ref_lock_enable = lock_external;
        })
    }

    fn set_level(&self, handle: DeviceHandle, level: f32) -> InstrumentResult<()> {
        self.with_open("set_level", handle, |s| s.rf.rf_level = level)
    }

    fn set_auto_level_disable(&self, handle: DeviceHandle, disable: u8) -> InstrumentResult<()> {
        self.with_open("set_auto_level_disable", handle, |s| {
            s.status.operate.auto_pwr_disable = disable
        })
    }

    fn get_rf_parameters(
        &self,
        handle: DeviceHandle,
        out: &mut [u8; RF_PARAMETERS_SIZE],
    ) -> InstrumentResult<()> {
        self.with_open("get_rf_parameters", handle, |s| *out = s.rf.encode())
    }

    fn get_device_status(
        &self,
        handle: DeviceHandle,
        out: &mut [u8; DEVICE_STATUS_SIZE],
    ) -> InstrumentResult<()> {
        self.with_open("get_device_status", handle, |s| *out = s.status.encode())
    }

    fn get_temperature(
        &self,
        handle: DeviceHandle,
        out: &mut [u8; TEMPERATURE_SIZE],
    ) -> InstrumentResult<()> {
        self.with_open("get_temperature", handle, |s| {
            *out = s.temperature.to_le_bytes()
        })
    }

    fn get_device_info(
        &self,
        handle: DeviceHandle,
        out: &mut [u8; DEVICE_INFO_SIZE],
    ) -> InstrumentResult<()> {
        self.with_open("get_device_info", handle, |s| *out = s.info.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_handles() {
        let lib = SimulatedSc5511a::new("10001A2B");
        assert!(lib.open_device("FFFF").is_err());

        let handle = lib.open_device("10001A2B").unwrap();
        lib.set_freq(handle, 7_000_000_000).unwrap();
        let mut buf = [0u8; RF_PARAMETERS_SIZE];
        lib.get_rf_parameters(handle, &mut buf).unwrap();
        assert_eq!(RfParameters::decode(&buf).unwrap().rf1_freq, 7_000_000_000);

        lib.close_device(handle).unwrap();
        assert!(lib.close_device(handle).is_err());
        assert!(lib.set_freq(handle, 1).is_err());
        assert_eq!(lib.handle_counts(), (1, 1));
    }

    #[test]
    fn test_injected_failure() {
        let lib = SimulatedSc5511a::new("10001A2B");
        let handle = lib.open_device("10001A2B").unwrap();
        lib.fail_on("set_level");
        let err = lib.set_level(handle, 0.0).unwrap_err();
        assert!(err.is_transport());
        assert!(lib.set_freq(handle, 1).is_ok());
    }
}
