//! Wire value codec
//!
//! Translates between the ASCII replies of SCPI instruments and typed
//! application values.
//!
//! Numeric array replies are comma-separated decimal text. Paired formats
//! (real/imaginary or magnitude/phase) are interleaved, so a reply of `2k`
//! floats holds `k` points.
//!
//! # Pairing precondition
//!
//! [`reshape_pairs`] and [`decode_complex`] only pair an **even-length**
//! sequence. An odd-length sequence is returned unchanged as
//! [`TraceData::Flat`] / [`ComplexTrace::Flat`]; no element is dropped or
//! padded.

use crate::error::{InstrumentError, InstrumentResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

// =============================================================================
// Scalars
// =============================================================================

/// Parse a floating-point reply such as `"+1.00000000000E+009"`.
pub fn parse_float(reply: &str) -> InstrumentResult<f64> {
    let trimmed = reply.trim();
    trimmed.parse::<f64>().map_err(|_| {
        InstrumentError::Protocol(format!("expected a number, got '{}'", trimmed))
    })
}

/// Parse an integer reply.
///
/// Instruments report integer settings either as `"+201"` or in exponent
/// form (`"2.01E+02"`); both are accepted as long as the value is integral.
pub fn parse_int(reply: &str) -> InstrumentResult<i64> {
    let trimmed = reply.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 => {
            Ok(value as i64)
        }
        _ => Err(InstrumentError::Protocol(format!(
            "expected an integer, got '{}'",
            trimmed
        ))),
    }
}

/// Trim whitespace and surrounding double quotes from a text reply.
pub fn parse_text(reply: &str) -> String {
    reply.trim().trim_matches('"').to_string()
}

/// Decode a comma-separated list of floats. An empty reply is an empty list.
pub fn parse_float_list(reply: &str) -> InstrumentResult<Vec<f64>> {
    let trimmed = parse_text(reply);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .enumerate()
        .map(|(index, item)| {
            item.trim().parse::<f64>().map_err(|_| {
                InstrumentError::Protocol(format!(
                    "element {} of numeric list is not a number: '{}'",
                    index,
                    item.trim()
                ))
            })
        })
        .collect()
}

// =============================================================================
// Paired data
// =============================================================================

/// A numeric trace, paired when the length allowed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceData {
    /// Interleaved values grouped as `(first, second)` per point.
    Paired(Vec<(f64, f64)>),
    /// Odd-length data, returned as received.
    Flat(Vec<f64>),
}

impl TraceData {
    /// Number of points (pairs count as one point).
    pub fn len(&self) -> usize {
        match self {
            TraceData::Paired(points) => points.len(),
            TraceData::Flat(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split paired data into its two component columns.
    pub fn columns(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        match self {
            TraceData::Paired(points) => Some(points.iter().copied().unzip()),
            TraceData::Flat(_) => None,
        }
    }
}

/// Group an interleaved sequence into pairs. Odd-length input stays flat.
pub fn reshape_pairs(values: Vec<f64>) -> TraceData {
    if values.len() % 2 != 0 {
        return TraceData::Flat(values);
    }
    TraceData::Paired(
        values
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect(),
    )
}

// =============================================================================
// Complex data
// =============================================================================

/// Unit of a phase value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AngleUnit {
    Degrees,
    Radians,
}

/// How the two numbers of each interleaved pair encode a complex point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairEncoding {
    /// `(real, imaginary)`, as sent for POL, SCOM and SDATA readouts.
    RealImag,
    /// `(magnitude in dB, phase)`, as sent for the PLOG format.
    LogMagPhase { phase: AngleUnit },
}

/// A complex trace, or the flat sequence when pairing was not possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexTrace {
    Complex(Vec<Complex64>),
    Flat(Vec<f64>),
}

impl ComplexTrace {
    pub fn len(&self) -> usize {
        match self {
            ComplexTrace::Complex(points) => points.len(),
            ComplexTrace::Flat(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build a complex point from a magnitude in dB and a phase.
pub fn from_log_polar(magnitude_db: f64, phase: f64, unit: AngleUnit) -> Complex64 {
    let radians = match unit {
        AngleUnit::Degrees => phase.to_radians(),
        AngleUnit::Radians => phase,
    };
    Complex64::from_polar(10f64.powf(magnitude_db / 20.0), radians)
}

/// Decode an interleaved reply into complex points.
pub fn decode_complex(reply: &str, encoding: PairEncoding) -> InstrumentResult<ComplexTrace> {
    let values = parse_float_list(reply)?;
    Ok(match reshape_pairs(values) {
        TraceData::Flat(values) => ComplexTrace::Flat(values),
        TraceData::Paired(pairs) => ComplexTrace::Complex(
            pairs
                .into_iter()
                .map(|(a, b)| match encoding {
                    PairEncoding::RealImag => Complex64::new(a, b),
                    PairEncoding::LogMagPhase { phase } => from_log_polar(a, b, phase),
                })
                .collect(),
        ),
    })
}

/// `20·log10|z|`
pub fn magnitude_db(z: Complex64) -> f64 {
    20.0 * z.norm().log10()
}

/// Phase of `z` in the requested unit.
pub fn phase(z: Complex64, unit: AngleUnit) -> f64 {
    let radians = z.im.atan2(z.re);
    match unit {
        AngleUnit::Degrees => radians.to_degrees(),
        AngleUnit::Radians => radians,
    }
}

/// `count` evenly spaced values from `start` to `stop`, both inclusive.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        stop
                    } else {
                        start + step * i as f64
                    }
                })
                .collect()
        }
    }
}

// =============================================================================
// Identification
// =============================================================================

/// Identification fields common to every instrument.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {})",
            self.vendor, self.model, self.serial, self.firmware
        )
    }
}

/// Parse an IEEE 488.2 `*IDN?` reply: `vendor,model,serial,firmware`.
pub fn parse_idn(reply: &str) -> InstrumentResult<Identity> {
    let text = parse_text(reply);
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    match fields.as_slice() {
        [vendor, model, serial, firmware, ..] => Ok(Identity {
            vendor: vendor.to_string(),
            model: model.to_string(),
            serial: serial.to_string(),
            firmware: firmware.to_string(),
        }),
        _ => Err(InstrumentError::Protocol(format!(
            "identification reply has {} fields: '{}'",
            fields.len(),
            text
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_float("+1.00000000000E+009\n").unwrap(), 1.0e9);
        assert_eq!(parse_int("+201").unwrap(), 201);
        assert_eq!(parse_int("2.01E+02").unwrap(), 201);
        assert_eq!(parse_text("\"CH1_S21_1,S21\"\n"), "CH1_S21_1,S21");

        let err = parse_float("MLOG").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        let err = parse_int("1.5").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_parse_float_list() {
        assert_eq!(
            parse_float_list("1.5,-2,+3E+00").unwrap(),
            vec![1.5, -2.0, 3.0]
        );
        assert!(parse_float_list("").unwrap().is_empty());

        let err = parse_float_list("1,abc,3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("element 1"));
    }

    #[test]
    fn test_complex_from_even_reply() {
        let trace = decode_complex("1,0,2,0,3,1", PairEncoding::RealImag).unwrap();
        assert_eq!(
            trace,
            ComplexTrace::Complex(vec![
                Complex64::new(1.0, 0.0),
                Complex64::new(2.0, 0.0),
                Complex64::new(3.0, 1.0),
            ])
        );
    }

    #[test]
    fn test_odd_reply_stays_flat() {
        let values = parse_float_list("1,2,3").unwrap();
        assert_eq!(reshape_pairs(values), TraceData::Flat(vec![1.0, 2.0, 3.0]));

        let trace = decode_complex("1,2,3", PairEncoding::RealImag).unwrap();
        assert_eq!(trace, ComplexTrace::Flat(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_log_polar_decoding() {
        let trace = decode_complex(
            "0,90,-20,0",
            PairEncoding::LogMagPhase {
                phase: AngleUnit::Degrees,
            },
        )
        .unwrap();
        let ComplexTrace::Complex(points) = trace else {
            panic!("expected complex points");
        };
        assert!((points[0] - Complex64::new(0.0, 1.0)).norm() < 1e-12);
        assert!((points[1] - Complex64::new(0.1, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_magnitude_and_phase() {
        let z = Complex64::new(0.0, 10.0);
        assert!((magnitude_db(z) - 20.0).abs() < 1e-12);
        assert!((phase(z, AngleUnit::Degrees) - 90.0).abs() < 1e-12);
        assert!((phase(z, AngleUnit::Radians) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_columns() {
        let data = reshape_pairs(vec![1.0, 10.0, 2.0, 20.0]);
        let (first, second) = data.columns().unwrap();
        assert_eq!(first, vec![1.0, 2.0]);
        assert_eq!(second, vec![10.0, 20.0]);
        assert!(TraceData::Flat(vec![1.0]).columns().is_none());
    }

    #[test]
    fn test_linspace() {
        let axis = linspace(-20.0, 0.0, 1601);
        assert_eq!(axis.len(), 1601);
        assert_eq!(axis[0], -20.0);
        assert_eq!(axis[1600], 0.0);
        assert!((axis[800] + 10.0).abs() < 1e-9);
        assert_eq!(linspace(1.0, 2.0, 1), vec![1.0]);
        assert!(linspace(1.0, 2.0, 0).is_empty());
    }

    #[test]
    fn test_parse_idn() {
        let id = parse_idn("Agilent Technologies,E5071C,MY46100000,A.09.10\n").unwrap();
        assert_eq!(id.vendor, "Agilent Technologies");
        assert_eq!(id.model, "E5071C");
        assert_eq!(id.serial, "MY46100000");
        assert_eq!(id.firmware, "A.09.10");
        assert!(parse_idn("Keysight").is_err());
    }
}
