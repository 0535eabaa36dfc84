//! AD5760 precision voltage/current source.
//!
//! The EVAL-AD5760SDZ board has no message protocol of its own. It is
//! driven register by register through Analog Devices ACE, behind the
//! [`client::RegisterClient`] trait.

pub mod client;
pub mod conversion;
pub mod driver;

pub use client::{AceBridgeClient, RegisterClient, SimulatedBoard};
pub use driver::{Ad5760, SourceParameters};
