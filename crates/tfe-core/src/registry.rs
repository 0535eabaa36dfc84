//! Parameter registry
//!
//! [`ParameterSet`] maps each parameter name to its accessor once, when a
//! driver is constructed. Everything that addresses parameters by name
//! (bundles, configuration files, the CLI) resolves through it, so an
//! unknown name is an ordinary [`InstrumentError::UnknownParameter`].

use crate::error::{InstrumentError, InstrumentResult};
use crate::parameter::{ParamValue, Parameter, ParameterBase, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name → value map applied or read as one unit.
pub type Bundle = BTreeMap<String, Value>;

/// Named parameters of one instrument.
#[derive(Default)]
pub struct ParameterSet {
    parameters: BTreeMap<String, Arc<dyn ParameterBase>>,
}

impl std::fmt::Debug for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterSet")
            .field("names", &self.names())
            .finish()
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed parameter. A later registration under the same name
    /// replaces the earlier one.
    pub fn register<T: ParamValue>(&mut self, parameter: Arc<Parameter<T>>) {
        let name = parameter.name().to_string();
        self.parameters.insert(name, parameter);
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> InstrumentResult<&Arc<dyn ParameterBase>> {
        self.parameters
            .get(name)
            .ok_or_else(|| InstrumentError::UnknownParameter(name.to_string()))
    }

    /// Look up a parameter with its concrete value type.
    pub fn get_typed<T: ParamValue>(&self, name: &str) -> Option<&Parameter<T>> {
        self.parameters
            .get(name)
            .and_then(|p| p.as_any().downcast_ref::<Parameter<T>>())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.parameters.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn ParameterBase)> {
        self.parameters
            .iter()
            .map(|(name, param)| (name.as_str(), param.as_ref()))
    }

    /// Query the device for one parameter.
    pub async fn get_value(&self, name: &str) -> InstrumentResult<Value> {
        self.get(name)?.get_value().await
    }

    /// Validate and set one parameter.
    pub async fn set_value(&self, name: &str, value: Value) -> InstrumentResult<()> {
        self.get(name)?.set_value(value).await
    }

    /// Check `value` for `name` without touching the device.
    pub fn validate_value(&self, name: &str, value: &Value) -> InstrumentResult<()> {
        self.get(name)?.validate_value(value)
    }

    /// Apply every entry of `bundle`.
    ///
    /// The whole bundle is checked (known name, writable, type, domain)
    /// before the first command is sent, so a bad entry leaves the device
    /// untouched.
    pub async fn apply_bundle(&self, bundle: &Bundle) -> InstrumentResult<()> {
        for (name, value) in bundle {
            self.validate_value(name, value)?;
        }
        for (name, value) in bundle {
            self.set_value(name, value.clone()).await?;
        }
        tracing::debug!(entries = bundle.len(), "Applied parameter bundle");
        Ok(())
    }

    /// Read the current device value of every named parameter.
    pub async fn read_bundle<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> InstrumentResult<Bundle> {
        let mut bundle = Bundle::new();
        for name in names {
            let value = self.get_value(name).await?;
            bundle.insert(name.to_string(), value);
        }
        Ok(bundle)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parameter::Domain;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logged(name: &str, domain: Domain, log: &Log) -> Arc<Parameter<f64>> {
        let log = Arc::clone(log);
        let tag = name.to_string();
        Arc::new(
            Parameter::new(name)
                .with_domain(domain)
                .with_hardware_read(|| Box::pin(async { Ok(1.5) }))
                .with_hardware_write(move |v| {
                    log.lock().push(format!("{} {}", tag, v));
                    Box::pin(async { Ok(()) })
                }),
        )
    }

    #[tokio::test]
    async fn test_bundle_is_validated_before_any_write() {
        let log: Log = Arc::default();
        let mut params = ParameterSet::new();
        params.register(logged("fstart", Domain::real(), &log));
        params.register(logged("power", Domain::numbers(-85.0, 10.0), &log));

        let mut bundle = Bundle::new();
        bundle.insert("fstart".into(), Value::Float(4e9));
        bundle.insert("power".into(), Value::Float(30.0));

        let err = params.apply_bundle(&bundle).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(log.lock().is_empty());

        bundle.insert("power".into(), Value::Int(-10));
        params.apply_bundle(&bundle).await.unwrap();
        assert_eq!(*log.lock(), vec!["fstart 4000000000", "power -10"]);
    }

    #[tokio::test]
    async fn test_unknown_name_in_bundle() {
        let log: Log = Arc::default();
        let mut params = ParameterSet::new();
        params.register(logged("fstart", Domain::real(), &log));

        let mut bundle = Bundle::new();
        bundle.insert("fstrat".into(), Value::Float(4e9));
        let err = params.apply_bundle(&bundle).await.unwrap_err();
        assert!(matches!(err, InstrumentError::UnknownParameter(ref n) if n == "fstrat"));

        let err = params.read_bundle(["fstart", "nope"]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[tokio::test]
    async fn test_read_bundle_and_typed_access() {
        let log: Log = Arc::default();
        let mut params = ParameterSet::new();
        params.register(logged("fstart", Domain::real(), &log));
        params.register(logged("fstop", Domain::real(), &log));

        let values = params.read_bundle(["fstop"]).await.unwrap();
        assert_eq!(values.get("fstop"), Some(&Value::Float(1.5)));
        assert_eq!(values.len(), 1);

        assert!(params.get_typed::<f64>("fstart").is_some());
        assert!(params.get_typed::<i64>("fstart").is_none());
        assert_eq!(params.names(), vec!["fstart", "fstop"]);
    }
}
