//! Keysight/Agilent network analyzer drivers.
//!
//! - [`EnaE5071c`]: ENA E5071C with averaged acquisition and trace files
//! - [`P9374a`]: P9374A USB analyzer with multi-trace handling
//!
//! Both are built on a [`tfe_core::transport::SharedTransport`], so tests
//! run against [`tfe_core::mock::MockScpiTransport`].
//!
//! ## Feature Flags
//!
//! - `storage_hdf5`: write trace files as HDF5
//! - `instrument_visa`: open non-socket VISA resources

pub mod acquisition;
pub mod ena;
pub mod p9374a;
pub mod params;
pub mod storage;
pub mod trace;

pub use ena::EnaE5071c;
pub use p9374a::P9374a;
pub use params::{VnaModel, VnaParameters};
pub use storage::{StorageFormat, TraceRecord};
pub use trace::{Trace, TraceInfo};

use async_trait::async_trait;
use tfe_core::codec::{Identity, TraceData};
use tfe_core::error::InstrumentResult;
use tfe_core::registry::ParameterSet;

/// Operations common to both analyzers.
#[async_trait]
pub trait NetworkAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> VnaModel;

    /// Name → parameter registry.
    fn registry(&self) -> &ParameterSet;

    async fn identify(&self) -> InstrumentResult<Identity>;

    /// Stimulus values of the current sweep.
    async fn frequency_axis(&self) -> InstrumentResult<Vec<f64>>;

    /// Current trace as magnitude/phase pairs (flat if odd-length).
    async fn trace(&self) -> InstrumentResult<TraceData>;
}
