//! Fixed-layout records filled in by the SC5511A library.
//!
//! The library writes C structs into caller-provided buffers. Each record
//! here documents its byte layout and decodes it explicitly, little-endian,
//! so decoding can be tested without a device.
//!
//! # Layouts
//!
//! `device_rf_params_t` (56 bytes, 8-byte aligned):
//!
//! | Offset | Width | Field              |
//! |--------|-------|--------------------|
//! | 0      | u64   | `rf1_freq` (Hz)    |
//! | 8      | u64   | `start_freq` (Hz)  |
//! | 16     | u64   | `stop_freq` (Hz)   |
//! | 24     | u64   | `step_freq` (Hz)   |
//! | 32     | u32   | `sweep_dwell_time` |
//! | 36     | u32   | `sweep_cycles`     |
//! | 40     | u32   | `buffer_time`      |
//! | 44     | f32   | `rf_level` (dBm)   |
//! | 48     | i16   | `rf2_freq` (MHz)   |
//! | 50     | -     | padding to 56      |
//!
//! `device_status_t` (31 bytes) is `list_mode_t` (8 × u8), then
//! `operate_status_t` (15 × u8), then `pll_status_t` (8 × u8).
//!
//! `device_info_t` (16 bytes): `serial_number` u32, `hardware_revision` f32,
//! `firmware_revision` f32, `manufacture_date` u32 (packed, see
//! [`ManufactureDate`]).
//!
//! `device_temperature_t` (4 bytes): `device_temp` f32, °C.

use serde::Serialize;
use tfe_core::error::{InstrumentError, InstrumentResult};

pub const RF_PARAMETERS_SIZE: usize = 56;
pub const LIST_MODE_SIZE: usize = 8;
pub const OPERATE_STATUS_SIZE: usize = 15;
pub const PLL_STATUS_SIZE: usize = 8;
pub const DEVICE_STATUS_SIZE: usize = LIST_MODE_SIZE + OPERATE_STATUS_SIZE + PLL_STATUS_SIZE;
pub const DEVICE_INFO_SIZE: usize = 16;
pub const TEMPERATURE_SIZE: usize = 4;

// =============================================================================
// Field access
// =============================================================================

/// Sequential little-endian reader over a record buffer.
struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn new(record: &str, bytes: &'a [u8], size: usize) -> InstrumentResult<Self> {
        if bytes.len() < size {
            return Err(InstrumentError::Protocol(format!(
                "{} needs {} bytes, got {}",
                record,
                size,
                bytes.len()
            )));
        }
        Ok(Self { bytes, offset: 0 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

// =============================================================================
// RF parameters
// =============================================================================

/// Decoded `device_rf_params_t`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RfParameters {
    pub rf1_freq: u64,
    pub start_freq: u64,
    pub stop_freq: u64,
    pub step_freq: u64,
    pub sweep_dwell_time: u32,
    pub sweep_cycles: u32,
    pub buffer_time: u32,
    pub rf_level: f32,
    pub rf2_freq: i16,
}

impl RfParameters {
    pub fn decode(bytes: &[u8]) -> InstrumentResult<Self> {
        let mut r = FieldReader::new("device_rf_params_t", bytes, RF_PARAMETERS_SIZE)?;
        Ok(Self {
            rf1_freq: r.u64(),
            start_freq: r.u64(),
            stop_freq: r.u64(),
            step_freq: r.u64(),
            sweep_dwell_time: r.u32(),
            sweep_cycles: r.u32(),
            buffer_time: r.u32(),
            rf_level: r.f32(),
            rf2_freq: r.i16(),
        })
    }

    pub fn encode(&self) -> [u8; RF_PARAMETERS_SIZE] {
        let mut out = [0u8; RF_PARAMETERS_SIZE];
        out[0..8].copy_from_slice(&self.rf1_freq.to_le_bytes());
        out[8..16].copy_from_slice(&self.start_freq.to_le_bytes());
        out[16..24].copy_from_slice(&self.stop_freq.to_le_bytes());
        out[24..32].copy_from_slice(&self.step_freq.to_le_bytes());
        out[32..36].copy_from_slice(&self.sweep_dwell_time.to_le_bytes());
        out[36..40].copy_from_slice(&self.sweep_cycles.to_le_bytes());
        out[40..44].copy_from_slice(&self.buffer_time.to_le_bytes());
        out[44..48].copy_from_slice(&self.rf_level.to_le_bytes());
        out[48..50].copy_from_slice(&self.rf2_freq.to_le_bytes());
        out
    }
}

// =============================================================================
// Device status
// =============================================================================

/// `list_mode_t`: sweep/list configuration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ListMode {
    pub sss_mode: u8,
    pub sweep_dir: u8,
    pub tri_waveform: u8,
    pub hw_trigger: u8,
    pub step_on_hw_trig: u8,
    pub return_to_start: u8,
    pub trig_out_enable: u8,
    pub trig_out_on_cycle: u8,
}

/// `operate_status_t`: one byte per flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OperateStatus {
    pub rf1_lock_mode: u8,
    pub rf1_loop_gain: u8,
    pub device_access: u8,
    pub rf2_standby: u8,
    pub rf1_standby: u8,
    pub auto_pwr_disable: u8,
    pub alc_mode: u8,
    pub rf1_out_enable: u8,
    pub ext_ref_lock_enable: u8,
    pub ext_ref_detect: u8,
    pub ref_out_select: u8,
    pub list_mode_running: u8,
    pub rf1_mode: u8,
    pub harmonic_ss: u8,
    pub over_temp: u8,
}

/// `pll_status_t`: lock-detect flag of each PLL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PllStatus {
    pub sum_pll_ld: u8,
    pub crs_pll_ld: u8,
    pub fine_pll_ld: u8,
    pub crs_ref_pll_ld: u8,
    pub crs_aux_pll_ld: u8,
    pub ref_100_pll_ld: u8,
    pub ref_10_pll_ld: u8,
    pub rf2_pll_ld: u8,
}

impl PllStatus {
    /// Every PLL reports lock.
    pub fn all_locked(&self) -> bool {
        [
            self.sum_pll_ld,
            self.crs_pll_ld,
            self.fine_pll_ld,
            self.crs_ref_pll_ld,
            self.crs_aux_pll_ld,
            self.ref_100_pll_ld,
            self.ref_10_pll_ld,
            self.rf2_pll_ld,
        ]
        .iter()
        .all(|&flag| flag != 0)
    }
}

/// Decoded `device_status_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceStatus {
    pub list_mode: ListMode,
    pub operate: OperateStatus,
    pub pll: PllStatus,
}

impl DeviceStatus {
    pub fn decode(bytes: &[u8]) -> InstrumentResult<Self> {
        let mut r = FieldReader::new("device_status_t", bytes, DEVICE_STATUS_SIZE)?;
        let list_mode = ListMode {
            sss_mode: r.u8(),
            sweep_dir: r.u8(),
            tri_waveform: r.u8(),
            hw_trigger: r.u8(),
            step_on_hw_trig: r.u8(),
            return_to_start: r.u8(),
            trig_out_enable: r.u8(),
            trig_out_on_cycle: r.u8(),
        };
        let operate = OperateStatus {
            rf1_lock_mode: r.u8(),
            rf1_loop_gain: r.u8(),
            device_access: r.u8(),
            rf2_standby: r.u8(),
            rf1_standby: r.u8(),
            auto_pwr_disable: r.u8(),
            alc_mode: r.u8(),
            rf1_out_enable: r.u8(),
            ext_ref_lock_enable: r.u8(),
            ext_ref_detect: r.u8(),
            ref_out_select: r.u8(),
            list_mode_running: r.u8(),
            rf1_mode: r.u8(),
            harmonic_ss: r.u8(),
            over_temp: r.u8(),
        };
        let pll = PllStatus {
            sum_pll_ld: r.u8(),
            crs_pll_ld: r.u8(),
            fine_pll_ld: r.u8(),
            crs_ref_pll_ld: r.u8(),
            crs_aux_pll_ld: r.u8(),
            ref_100_pll_ld: r.u8(),
            ref_10_pll_ld: r.u8(),
            rf2_pll_ld: r.u8(),
        };
        Ok(Self {
            list_mode,
            operate,
            pll,
        })
    }

    pub fn encode(&self) -> [u8; DEVICE_STATUS_SIZE] {
        let l = &self.list_mode;
        let o = &self.operate;
        let p = &self.pll;
        [
            l.sss_mode,
            l.sweep_dir,
            l.tri_waveform,
            l.hw_trigger,
            l.step_on_hw_trig,
            l.return_to_start,
            l.trig_out_enable,
            l.trig_out_on_cycle,
            o.rf1_lock_mode,
            o.rf1_loop_gain,
            o.device_access,
            o.rf2_standby,
            o.rf1_standby,
            o.auto_pwr_disable,
            o.alc_mode,
            o.rf1_out_enable,
            o.ext_ref_lock_enable,
            o.ext_ref_detect,
            o.ref_out_select,
            o.list_mode_running,
            o.rf1_mode,
            o.harmonic_ss,
            o.over_temp,
            p.sum_pll_ld,
            p.crs_pll_ld,
            p.fine_pll_ld,
            p.crs_ref_pll_ld,
            p.crs_aux_pll_ld,
            p.ref_100_pll_ld,
            p.ref_10_pll_ld,
            p.rf2_pll_ld,
        ]
    }
}

// =============================================================================
// Device info
// =============================================================================

/// Manufacture date packed into 32 bits.
///
/// | Bits  | Field                  |
/// |-------|------------------------|
/// | 31-24 | year, offset from 2000 |
/// | 23-16 | day                    |
/// | 15-8  | month                  |
/// | 7-0   | unused                 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManufactureDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl ManufactureDate {
    pub fn from_packed(packed: u32) -> Self {
        let [year, day, month, _] = packed.to_be_bytes();
        Self {
            year: 2000 + u16::from(year),
            month,
            day,
        }
    }

    pub fn to_packed(self) -> u32 {
        let year = self.year.saturating_sub(2000).min(255) as u8;
        u32::from_be_bytes([year, self.day, self.month, 0])
    }
}

impl std::fmt::Display for ManufactureDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.month, self.day, self.year)
    }
}

/// Decoded `device_info_t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub serial_number: u32,
    pub hardware_revision: f32,
    pub firmware_revision: f32,
    pub manufacture_date: ManufactureDate,
}

impl DeviceInfo {
    pub fn decode(bytes: &[u8]) -> InstrumentResult<Self> {
        let mut r = FieldReader::new("device_info_t", bytes, DEVICE_INFO_SIZE)?;
        Ok(Self {
            serial_number: r.u32(),
            hardware_revision: r.f32(),
            firmware_revision: r.f32(),
            manufacture_date: ManufactureDate::from_packed(r.u32()),
        })
    }

    pub fn encode(&self) -> [u8; DEVICE_INFO_SIZE] {
        let mut out = [0u8; DEVICE_INFO_SIZE];
        out[0..4].copy_from_slice(&self.serial_number.to_le_bytes());
        out[4..8].copy_from_slice(&self.hardware_revision.to_le_bytes());
        out[8..12].copy_from_slice(&self.firmware_revision.to_le_bytes());
        out[12..16].copy_from_slice(&self.manufacture_date.to_packed().to_le_bytes());
        out
    }
}

/// Decoded `device_temperature_t`, °C.
pub fn decode_temperature(bytes: &[u8]) -> InstrumentResult<f32> {
    let mut r = FieldReader::new("device_temperature_t", bytes, TEMPERATURE_SIZE)?;
    Ok(r.f32())
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use tfe_core::error::ErrorKind;

    #[test]
    fn test_rf_parameters_layout() {
        let mut bytes = [0u8; RF_PARAMETERS_SIZE];
        bytes[0..8].copy_from_slice(&6_500_000_000u64.to_le_bytes());
        bytes[32..36].copy_from_slice(&500u32.to_le_bytes());
        bytes[44..48].copy_from_slice(&(-12.5f32).to_le_bytes());
        bytes[48..50].copy_from_slice(&(-3i16).to_le_bytes());
        // Trailing padding is ignored
        bytes[50..56].copy_from_slice(&[0xAA; 6]);

        let rf = RfParameters::decode(&bytes).unwrap();
        assert_eq!(rf.rf1_freq, 6_500_000_000);
        assert_eq!(rf.start_freq, 0);
        assert_eq!(rf.sweep_dwell_time, 500);
        assert_eq!(rf.rf_level, -12.5);
        assert_eq!(rf.rf2_freq, -3);

        assert_eq!(RfParameters::decode(&rf.encode()).unwrap(), rf);
    }

    #[test]
    fn test_short_buffer_is_protocol_error() {
        let err = RfParameters::decode(&[0u8; 50]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(DeviceStatus::decode(&[0u8; 30]).is_err());
        assert!(decode_temperature(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_device_status_field_order() {
        let bytes: Vec<u8> = (0..DEVICE_STATUS_SIZE as u8).collect();
        let status = DeviceStatus::decode(&bytes).unwrap();
        assert_eq!(status.list_mode.sss_mode, 0);
        assert_eq!(status.list_mode.trig_out_on_cycle, 7);
        assert_eq!(status.operate.rf1_lock_mode, 8);
        assert_eq!(status.operate.auto_pwr_disable, 13);
        assert_eq!(status.operate.rf1_out_enable, 15);
        assert_eq!(status.operate.ext_ref_lock_enable, 16);
        assert_eq!(status.operate.over_temp, 22);
        assert_eq!(status.pll.sum_pll_ld, 23);
        assert_eq!(status.pll.rf2_pll_ld, 30);
        assert_eq!(status.encode().to_vec(), bytes);
    }

    #[test]
    fn test_manufacture_date() {
        // year 21, day 15, month 3
        let date = ManufactureDate::from_packed(0x150F_0300);
        assert_eq!(
            date,
            ManufactureDate {
                year: 2021,
                month: 3,
                day: 15
            }
        );
        assert_eq!(date.to_string(), "3/15/2021");
        assert_eq!(date.to_packed(), 0x150F_0300);

        // Single-digit year offsets still give a four-digit year
        assert_eq!(ManufactureDate::from_packed(0x0501_0C00).to_string(), "12/1/2005");
    }

    #[test]
    fn test_device_info() {
        let mut bytes = [0u8; DEVICE_INFO_SIZE];
        bytes[0..4].copy_from_slice(&0x1000_24E0u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&2.0f32.to_le_bytes());
        bytes[8..12].copy_from_slice(&3.5f32.to_le_bytes());
        bytes[12..16].copy_from_slice(&0x150F_0300u32.to_le_bytes());

        let info = DeviceInfo::decode(&bytes).unwrap();
        assert_eq!(info.serial_number, 0x1000_24E0);
        assert_eq!(info.hardware_revision, 2.0);
        assert_eq!(info.firmware_revision, 3.5);
        assert_eq!(info.manufacture_date.year, 2021);
        assert_eq!(info.encode(), bytes);
    }

    #[test]
    fn test_pll_lock() {
        let mut status = DeviceStatus::default();
        assert!(!status.pll.all_locked());
        status.pll = PllStatus {
            sum_pll_ld: 1,
            crs_pll_ld: 1,
            fine_pll_ld: 1,
            crs_ref_pll_ld: 1,
            crs_aux_pll_ld: 1,
            ref_100_pll_ld: 1,
            ref_10_pll_ld: 1,
            rf2_pll_ld: 1,
        };
        assert!(status.pll.all_locked());
    }
}
