//! AD5760 register encoding.
//!
//! The data register is written with a 16-bit offset-binary code and read
//! back as 20 bits, with the 16-bit code left-justified. Both map the
//! -10..10 V span linearly.

use tfe_core::error::{InstrumentError, InstrumentResult};

/// Output span, volts.
pub const V_MIN: f64 = -10.0;
pub const V_MAX: f64 = 10.0;
const SPAN: f64 = V_MAX - V_MIN;

/// Largest 16-bit write code.
pub const WRITE_CODE_MAX: u32 = 0xFFFF;
const WRITE_FULL_SCALE: f64 = 65536.0;

const READ_FULL_SCALE: f64 = 1_048_576.0;
const READ_MIDSCALE: f64 = 524_288.0;

/// Data register address.
pub const DATA_REGISTER: &str = "1";
/// Control register address.
pub const CONTROL_REGISTER: &str = "2";

/// Control word written at start-up, output enabled.
pub const CONTROL_OUTPUT_ON: u32 = 786;
/// Output-ground clamp bit of the control register.
pub const OPGND_BIT: u32 = 1 << 2;

/// Write code for `volts`, truncated toward zero and limited to 16 bits.
pub fn voltage_to_code(volts: f64) -> u32 {
    let code = ((volts - V_MIN) * WRITE_FULL_SCALE / SPAN).trunc();
    code.clamp(0.0, f64::from(WRITE_CODE_MAX)) as u32
}

/// Voltage of a 20-bit readback code.
pub fn code_to_voltage(code: u32) -> f64 {
    (f64::from(code) - READ_MIDSCALE) * SPAN / READ_FULL_SCALE
}

/// Parse a hex register reply, with or without a `0x` prefix.
pub fn parse_register(reply: &str) -> InstrumentResult<u32> {
    let trimmed = reply.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).map_err(|e| {
        InstrumentError::Protocol(format!("invalid register reply '{}': {}", reply, e))
    })
}

/// Control word for the given output state.
pub fn control_word(output_on: bool) -> u32 {
    if output_on {
        CONTROL_OUTPUT_ON
    } else {
        CONTROL_OUTPUT_ON | OPGND_BIT
    }
}
