//! `tfe-core`
//!
//! Shared building blocks for the tfe instrument drivers.
//!
//! Every driver in the workspace is assembled from the same pieces:
//!
//! - [`transport`]: request/response channel to the instrument (SCPI over
//!   TCP, optionally VISA)
//! - [`codec`]: wire text to typed values (scalars, float lists, paired and
//!   complex traces)
//! - [`parameter`]: `Parameter<T>`, a named and validated device property
//!   bound to hardware callbacks
//! - [`registry`]: the name → parameter map used for bundles and configuration
//! - [`ramp`]: stepped ramps of a numeric parameter
//! - [`config`]: station configuration files
//! - [`mock`]: a simulated SCPI device for tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfe_core::parameter::{Domain, Parameter};
//! use tfe_core::transport::{SharedTransport, TcpScpiTransport};
//! # async fn example() -> tfe_core::error::InstrumentResult<()> {
//! let transport: SharedTransport = Arc::new(
//!     TcpScpiTransport::connect("TCPIP0::192.168.1.20::5025::SOCKET", std::time::Duration::from_secs(5)).await?,
//! );
//! let power = Parameter::<f64>::new("power")
//!     .with_unit("dBm")
//!     .with_domain(Domain::numbers(-85.0, 10.0))
//!     .scpi_query(&transport, ":SOUR1:POW?")
//!     .scpi_command(&transport, ":SOUR1:POW {}");
//! power.set(-20.0).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod mock;
pub mod parameter;
pub mod ramp;
pub mod registry;
pub mod transport;
#[cfg(feature = "instrument_visa")]
pub mod visa;

pub use error::{ErrorKind, InstrumentError, InstrumentResult};
pub use parameter::{Domain, ParamValue, Parameter, ParameterBase, Value};
pub use registry::{Bundle, ParameterSet};
pub use transport::{SharedTransport, Transport};
