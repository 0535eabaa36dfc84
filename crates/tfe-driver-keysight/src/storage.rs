//! Saved trace files
//!
//! A [`TraceRecord`] holds one averaged acquisition in the layout analysis
//! scripts expect:
//!
//! | Dataset              | Shape   | Contents                        |
//! |----------------------|---------|---------------------------------|
//! | `VNA Frequency (Hz)` | `[n]`   | stimulus frequencies            |
//! | `S21`                | `[2,n]` | row 0 magnitude dB, row 1 phase |
//! | `Phase (deg)`        | `[n]`   | phase, degrees                  |
//! | `Power (dB)`         | `[n]`   | log magnitude, dB               |
//!
//! Files ending in `.h5` or `.hdf5` are written as HDF5 (requires the
//! `storage_hdf5` feature); anything else is written as JSON with the same
//! keys.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tfe_core::codec::{self, AngleUnit, TraceData};
use tfe_core::error::{InstrumentError, InstrumentResult};

pub const FREQUENCY_DATASET: &str = "VNA Frequency (Hz)";
pub const S21_DATASET: &str = "S21";
pub const PHASE_DATASET: &str = "Phase (deg)";
pub const POWER_DATASET: &str = "Power (dB)";

/// One saved acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    #[serde(rename = "VNA Frequency (Hz)")]
    pub frequency: Vec<f64>,

    /// `[magnitudes_db, phases_deg]`
    #[serde(rename = "S21")]
    pub s21: [Vec<f64>; 2],

    #[serde(rename = "Phase (deg)")]
    pub phase_deg: Vec<f64>,

    #[serde(rename = "Power (dB)")]
    pub power_db: Vec<f64>,
}

impl TraceRecord {
    /// Build a record from a frequency axis and log-magnitude/phase pairs.
    pub fn from_polar(frequency: Vec<f64>, trace: &TraceData) -> InstrumentResult<Self> {
        let (power_db, phase_deg) = trace.columns().ok_or_else(|| {
            InstrumentError::Protocol(format!(
                "trace of {} values cannot be split into magnitude and phase",
                trace.len()
            ))
        })?;
        if power_db.len() != frequency.len() {
            return Err(InstrumentError::Protocol(format!(
                "trace has {} points but the frequency axis has {}",
                power_db.len(),
                frequency.len()
            )));
        }
        Ok(Self {
            frequency,
            s21: [power_db.clone(), phase_deg.clone()],
            phase_deg,
            power_db,
        })
    }

    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }

    /// S21 as complex points.
    pub fn complex_points(&self) -> Vec<Complex64> {
        self.power_db
            .iter()
            .zip(&self.phase_deg)
            .map(|(&db, &phase)| codec::from_log_polar(db, phase, AngleUnit::Degrees))
            .collect()
    }

    /// Write to `path` in the format [`StorageFormat::for_path`] picks.
    pub async fn write(&self, path: &Path) -> InstrumentResult<()> {
        match StorageFormat::for_path(path)? {
            StorageFormat::Json => self.write_json(path).await,
            StorageFormat::Hdf5 => self.write_hdf5(path).await,
        }
    }

    pub async fn write_json(&self, path: &Path) -> InstrumentResult<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| InstrumentError::Storage(format!("{}: {}", path.display(), e)))?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    pub async fn read_json(path: &Path) -> InstrumentResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| InstrumentError::Storage(format!("{}: {}", path.display(), e)))
    }

    /// HDF5 calls block, so the file is written on the blocking pool.
    #[cfg(feature = "storage_hdf5")]
    pub async fn write_hdf5(&self, path: &Path) -> InstrumentResult<()> {
        let record = self.clone();
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || record.write_hdf5_blocking(&target))
            .await
            .map_err(|e| InstrumentError::Storage(format!("{}: {}", path.display(), e)))?
    }

    #[cfg(feature = "storage_hdf5")]
    fn write_hdf5_blocking(&self, path: &Path) -> InstrumentResult<()> {
        let storage = |e: hdf5::Error| InstrumentError::Storage(format!("{}: {}", path.display(), e));
        let file = hdf5::File::create(path).map_err(storage)?;

        for (name, values) in [
            (FREQUENCY_DATASET, &self.frequency),
            (PHASE_DATASET, &self.phase_deg),
            (POWER_DATASET, &self.power_db),
        ] {
            file.new_dataset::<f64>()
                .shape(values.len())
                .create(name)
                .and_then(|ds| ds.write_raw(values.as_slice()))
                .map_err(storage)?;
        }

        let s21: Vec<f64> = self.s21.iter().flatten().copied().collect();
        file.new_dataset::<f64>()
            .shape((2, self.len()))
            .create(S21_DATASET)
            .and_then(|ds| ds.write_raw(s21.as_slice()))
            .map_err(storage)?;

        Ok(())
    }

    #[cfg(not(feature = "storage_hdf5"))]
    pub async fn write_hdf5(&self, path: &Path) -> InstrumentResult<()> {
        Err(hdf5_unavailable(path))
    }
}

/// On-disk format of a [`TraceRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFormat {
    Json,
    Hdf5,
}

impl StorageFormat {
    /// `.h5`/`.hdf5` select HDF5, anything else JSON. Fails when HDF5 is
    /// selected but this build cannot write it.
    pub fn for_path(path: &Path) -> InstrumentResult<Self> {
        if !is_hdf5_path(path) {
            return Ok(StorageFormat::Json);
        }
        if cfg!(feature = "storage_hdf5") {
            Ok(StorageFormat::Hdf5)
        } else {
            Err(hdf5_unavailable(path))
        }
    }
}

fn hdf5_unavailable(path: &Path) -> InstrumentError {
    InstrumentError::Storage(format!(
        "{}: HDF5 output requires the storage_hdf5 feature",
        path.display()
    ))
}

fn is_hdf5_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("h5") || e.eq_ignore_ascii_case("hdf5"))
        .unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use tfe_core::error::ErrorKind;

    fn record() -> TraceRecord {
        let trace = codec::reshape_pairs(vec![-20.0, 90.0, 0.0, 180.0]);
        TraceRecord::from_polar(vec![4.0e9, 5.0e9], &trace).unwrap()
    }

    #[test]
    fn test_from_polar_layout() {
        let record = record();
        assert_eq!(record.s21, [vec![-20.0, 0.0], vec![90.0, 180.0]]);
        assert_eq!(record.power_db, vec![-20.0, 0.0]);
        assert_eq!(record.phase_deg, vec![90.0, 180.0]);

        let points = record.complex_points();
        assert!((points[0].re).abs() < 1e-12);
        assert!((points[0].im - 0.1).abs() < 1e-12);
        assert!((points[1].re + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_polar_rejects_mismatches() {
        let flat = codec::reshape_pairs(vec![1.0, 2.0, 3.0]);
        let err = TraceRecord::from_polar(vec![1.0], &flat).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let paired = codec::reshape_pairs(vec![1.0, 2.0]);
        let err = TraceRecord::from_polar(vec![1.0, 2.0], &paired).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_json_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        record().write(&path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        for key in [FREQUENCY_DATASET, S21_DATASET, PHASE_DATASET, POWER_DATASET] {
            assert!(text.contains(key), "missing {}", key);
        }
        assert_eq!(TraceRecord::read_json(&path).await.unwrap(), record());
    }

    #[test]
    fn test_extension_selects_format() {
        assert!(is_hdf5_path(Path::new("run/trace.h5")));
        assert!(is_hdf5_path(Path::new("trace.HDF5")));
        assert!(!is_hdf5_path(Path::new("trace.json")));
        assert!(!is_hdf5_path(Path::new("trace")));

        assert_eq!(
            StorageFormat::for_path(Path::new("trace")).unwrap(),
            StorageFormat::Json
        );
        let hdf5 = StorageFormat::for_path(Path::new("trace.h5"));
        if cfg!(feature = "storage_hdf5") {
            assert_eq!(hdf5.unwrap(), StorageFormat::Hdf5);
        } else {
            assert_eq!(hdf5.unwrap_err().kind(), ErrorKind::Storage);
        }
    }
}
