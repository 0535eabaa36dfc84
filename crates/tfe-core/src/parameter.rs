//! Parameter<T> - typed, validated device properties
//!
//! A [`Parameter`] names one device setting and binds it to the hardware
//! through two optional callbacks: a reader (query the device, decode the
//! reply) and a writer (encode the value, send the command). The device is
//! the source of truth: `get()` always goes to the hardware, and the only
//! client-side state kept is the last value sent.
//!
//! # Data Flow
//!
//! ```text
//! set(v) ──► validate(v) against Domain ──► writer(v) ──► Transport::write("CMD v")
//!               │ rejected
//!               └──► InstrumentError::Validation   (nothing sent)
//!
//! get() ──► reader() ──► Transport::ask("CMD?") ──► T::decode(reply)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let fstart = Parameter::<f64>::new("fstart")
//!     .with_unit("Hz")
//!     .with_domain(Domain::real())
//!     .scpi_query(&transport, ":SENS1:FREQ:STAR?")
//!     .scpi_command(&transport, ":SENS1:FREQ:STAR {}");
//!
//! fstart.set(4.0e9).await?;
//! let value = fstart.get().await?;
//! ```

use crate::codec;
use crate::error::{InstrumentError, InstrumentResult};
use crate::transport::SharedTransport;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Value
// =============================================================================

/// Untyped parameter value, used by the registry and by bundles.
///
/// Deserializes untagged, so TOML `power = -20` is an `Int`,
/// `power = -20.5` a `Float` and `trform = "MLOG"` a `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<f64>),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view; integral floats qualify.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Array(values) => write!(f, "[{} values]", values.len()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

// =============================================================================
// Domain
// =============================================================================

/// Set of values a parameter accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// Real numbers, optionally bounded (inclusive).
    Numbers { min: Option<f64>, max: Option<f64> },
    /// Integers, optionally bounded (inclusive).
    Ints { min: Option<i64>, max: Option<i64> },
    /// Closed set of strings, matched exactly.
    Enum(Vec<String>),
    /// No constraint.
    Any,
}

impl Domain {
    /// Bounded real interval `[min, max]`.
    pub fn numbers(min: f64, max: f64) -> Self {
        Domain::Numbers {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Any real number.
    pub fn real() -> Self {
        Domain::Numbers {
            min: None,
            max: None,
        }
    }

    /// Bounded integer interval `[min, max]`.
    pub fn ints(min: i64, max: i64) -> Self {
        Domain::Ints {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Integers no smaller than `min`.
    pub fn ints_from(min: i64) -> Self {
        Domain::Ints {
            min: Some(min),
            max: None,
        }
    }

    pub fn choices(choices: &[&str]) -> Self {
        Domain::Enum(choices.iter().map(|c| c.to_string()).collect())
    }

    /// Check `value` against the domain. `parameter` names the error.
    pub fn check(&self, parameter: &str, value: &Value) -> InstrumentResult<()> {
        match self {
            Domain::Any => Ok(()),
            Domain::Numbers { min, max } => {
                let v = value.as_f64().ok_or_else(|| {
                    InstrumentError::validation(parameter, format!("{} is not a number", value))
                })?;
                if v.is_nan() {
                    return Err(InstrumentError::validation(parameter, "NaN is not allowed"));
                }
                if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                    return Err(InstrumentError::validation(
                        parameter,
                        format!("{} outside {}", v, self),
                    ));
                }
                Ok(())
            }
            Domain::Ints { min, max } => {
                let v = value.as_i64().ok_or_else(|| {
                    InstrumentError::validation(parameter, format!("{} is not an integer", value))
                })?;
                if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                    return Err(InstrumentError::validation(
                        parameter,
                        format!("{} outside {}", v, self),
                    ));
                }
                Ok(())
            }
            Domain::Enum(choices) => match value.as_str() {
                Some(s) if choices.iter().any(|c| c == s) => Ok(()),
                _ => Err(InstrumentError::validation(
                    parameter,
                    format!("{} is not one of {}", value, self),
                )),
            },
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn bound<T: fmt::Display>(b: &Option<T>, open: &str) -> String {
            b.as_ref().map_or_else(|| open.to_string(), |v| v.to_string())
        }
        match self {
            Domain::Numbers { min, max } => write!(f, "[{}, {}]", bound(min, "-inf"), bound(max, "inf")),
            Domain::Ints { min, max } => write!(f, "[{}, {}]", bound(min, "-inf"), bound(max, "inf")),
            Domain::Enum(choices) => write!(f, "{{{}}}", choices.join(", ")),
            Domain::Any => write!(f, "any"),
        }
    }
}

// =============================================================================
// ParamValue
// =============================================================================

/// Types a [`Parameter`] can carry, with their wire encoding.
pub trait ParamValue: Clone + fmt::Debug + Send + Sync + 'static {
    /// Decode a device reply. Malformed replies are protocol errors.
    fn decode(reply: &str) -> InstrumentResult<Self>;

    /// Encode for a set command.
    fn encode(&self) -> String;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

impl ParamValue for f64 {
    fn decode(reply: &str) -> InstrumentResult<Self> {
        codec::parse_float(reply)
    }

    fn encode(&self) -> String {
        self.to_string()
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl ParamValue for i64 {
    fn decode(reply: &str) -> InstrumentResult<Self> {
        codec::parse_int(reply)
    }

    fn encode(&self) -> String {
        self.to_string()
    }

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl ParamValue for String {
    fn decode(reply: &str) -> InstrumentResult<Self> {
        Ok(codec::parse_text(reply))
    }

    fn encode(&self) -> String {
        self.clone()
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl ParamValue for Vec<f64> {
    fn decode(reply: &str) -> InstrumentResult<Self> {
        codec::parse_float_list(reply)
    }

    fn encode(&self) -> String {
        self.iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn to_value(&self) -> Value {
        Value::Array(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(values) => Some(values.clone()),
            _ => None,
        }
    }
}

// =============================================================================
// Parameter<T>
// =============================================================================

type HardwareReader<T> = Arc<dyn Fn() -> BoxFuture<'static, InstrumentResult<T>> + Send + Sync>;
type HardwareWriter<T> = Arc<dyn Fn(T) -> BoxFuture<'static, InstrumentResult<()>> + Send + Sync>;

/// A named, typed device property.
pub struct Parameter<T: ParamValue> {
    name: String,
    label: Option<String>,
    unit: Option<String>,
    description: Option<String>,
    domain: Domain,
    reader: Option<HardwareReader<T>>,
    writer: Option<HardwareWriter<T>>,
    last_set: parking_lot::RwLock<Option<T>>,
}

impl<T: ParamValue> fmt::Debug for Parameter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("domain", &self.domain)
            .field("readable", &self.reader.is_some())
            .field("writable", &self.writer.is_some())
            .finish()
    }
}

impl<T: ParamValue> Parameter<T> {
    /// Create an unbound parameter with no constraint.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            unit: None,
            description: None,
            domain: Domain::Any,
            reader: None,
            writer: None,
            last_set: parking_lot::RwLock::new(None),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Attach the async hardware reader.
    pub fn with_hardware_read(
        mut self,
        reader: impl Fn() -> BoxFuture<'static, InstrumentResult<T>> + Send + Sync + 'static,
    ) -> Self {
        self.reader = Some(Arc::new(reader));
        self
    }

    /// Attach the async hardware writer. Without one the parameter is read-only.
    pub fn with_hardware_write(
        mut self,
        writer: impl Fn(T) -> BoxFuture<'static, InstrumentResult<()>> + Send + Sync + 'static,
    ) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    /// Read by sending `command` and decoding the reply as `T`.
    pub fn scpi_query(self, transport: &SharedTransport, command: impl Into<String>) -> Self {
        let transport = Arc::clone(transport);
        let command = command.into();
        self.with_hardware_read(move || {
            let transport = Arc::clone(&transport);
            let command = command.clone();
            Box::pin(async move {
                let reply = transport.ask(&command).await?;
                T::decode(&reply)
            })
        })
    }

    /// Write by substituting the encoded value for `{}` in `template`.
    pub fn scpi_command(self, transport: &SharedTransport, template: impl Into<String>) -> Self {
        let transport = Arc::clone(transport);
        let template = template.into();
        self.with_hardware_write(move |value: T| {
            let transport = Arc::clone(&transport);
            let command = template.replace("{}", &value.encode());
            Box::pin(async move { transport.write(&command).await })
        })
    }

    /// Bind both directions at once: `get_command` for reads and
    /// `set_template` (with `{}` for the value) for writes.
    pub fn bind_scpi(
        self,
        transport: &SharedTransport,
        get_command: impl Into<String>,
        set_template: impl Into<String>,
    ) -> Self {
        self.scpi_query(transport, get_command)
            .scpi_command(transport, set_template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    /// Last value successfully sent to the device, if any.
    pub fn last_set(&self) -> Option<T> {
        self.last_set.read().clone()
    }

    /// Check a candidate value without touching the device.
    pub fn validate(&self, value: &T) -> InstrumentResult<()> {
        self.domain.check(&self.name, &value.to_value())
    }

    /// Query the device for the current value.
    pub async fn get(&self) -> InstrumentResult<T> {
        let reader = self.reader.as_ref().ok_or_else(|| {
            InstrumentError::Unsupported(format!("parameter '{}' cannot be read", self.name))
        })?;
        let value = reader().await?;
        tracing::trace!(parameter = %self.name, ?value, "Parameter read");
        Ok(value)
    }

    /// Validate, then send `value` to the device.
    pub async fn set(&self, value: T) -> InstrumentResult<()> {
        let writer = self.writer()?;

        // Reject before any transmission
        self.validate(&value)?;

        writer(value.clone()).await?;
        tracing::debug!(parameter = %self.name, ?value, "Parameter set");
        *self.last_set.write() = Some(value);
        Ok(())
    }

    /// Send back a value previously read from the device with [`get`].
    ///
    /// The domain is not checked: the device may report states this driver
    /// never sets itself, and those must still be put back.
    ///
    /// [`get`]: Parameter::get
    pub async fn restore(&self, value: T) -> InstrumentResult<()> {
        let writer = self.writer()?;
        writer(value.clone()).await?;
        tracing::debug!(parameter = %self.name, ?value, "Parameter restored");
        *self.last_set.write() = Some(value);
        Ok(())
    }

    fn writer(&self) -> InstrumentResult<&HardwareWriter<T>> {
        self.writer.as_ref().ok_or_else(|| {
            InstrumentError::Unsupported(format!("parameter '{}' is read-only", self.name))
        })
    }

    fn typed(&self, value: &Value) -> InstrumentResult<T> {
        T::from_value(value).ok_or_else(|| {
            InstrumentError::validation(
                &self.name,
                format!("{} has the wrong type for this parameter", value),
            )
        })
    }
}

// =============================================================================
// Type-erased access
// =============================================================================

/// Object-safe view of a [`Parameter`] used by the registry.
pub trait ParameterBase: Send + Sync {
    fn name(&self) -> &str;

    fn unit(&self) -> Option<&str>;

    fn domain(&self) -> &Domain;

    fn is_read_only(&self) -> bool;

    /// Check type and domain of `value` without touching the device.
    fn validate_value(&self, value: &Value) -> InstrumentResult<()>;

    fn get_value(&self) -> BoxFuture<'_, InstrumentResult<Value>>;

    fn set_value(&self, value: Value) -> BoxFuture<'_, InstrumentResult<()>>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: ParamValue> ParameterBase for Parameter<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    fn validate_value(&self, value: &Value) -> InstrumentResult<()> {
        if self.writer.is_none() {
            return Err(InstrumentError::Unsupported(format!(
                "parameter '{}' is read-only",
                self.name
            )));
        }
        let typed = self.typed(value)?;
        self.validate(&typed)
    }

    fn get_value(&self) -> BoxFuture<'_, InstrumentResult<Value>> {
        Box::pin(async move { self.get().await.map(|v| v.to_value()) })
    }

    fn set_value(&self, value: Value) -> BoxFuture<'_, InstrumentResult<()>> {
        Box::pin(async move {
            let typed = self.typed(&value)?;
            self.set(typed).await
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
