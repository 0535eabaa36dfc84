//! SignalCore SC5511A RF signal generator.
//!
//! The generator is driven through the vendor's C library rather than a
//! message protocol. [`library::Sc5511aLibrary`] is the seam: the `ffi`
//! implementation links the real library, [`library::SimulatedSc5511a`]
//! stands in for it in tests.
//!
//! ## Feature Flags
//!
//! - `sc5511a_sdk`: link against the vendor `sc5511a` shared library

pub mod driver;
pub mod library;
pub mod records;
pub mod session;

pub use driver::{GeneratorParameters, Sc5511a, Sc5511aIdentity};
pub use library::{Sc5511aLibrary, SimulatedSc5511a};
pub use records::{DeviceInfo, DeviceStatus, ManufactureDate, RfParameters};
