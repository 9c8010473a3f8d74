//! Invokable methods and the registry that owns them.
//!
//! A [`Method`] pairs an ordered input/output argument schema with a handler.
//! Handlers receive inputs already converted to their declared types; the
//! [`Dispatcher`](crate::dispatch::Dispatcher) performs that conversion.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::Builder;
use crate::error::{Error, Result};
use crate::value::{DataType, ValueRank, Variant};
use crate::variable::VariableStore;

/// Declared method argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub data_type: DataType,
    pub rank: ValueRank,
    pub description: String,
}

impl Argument {
    pub fn new(name: impl Into<String>, data_type: DataType, rank: ValueRank) -> Self {
        Self {
            name: name.into(),
            data_type,
            rank,
            description: String::new(),
        }
    }

    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, ValueRank::Scalar)
    }

    pub fn array(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, ValueRank::OneDimension)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A business-level failure raised by a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerFault(pub String);

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<Error> for HandlerFault {
    fn from(e: Error) -> Self {
        Self(e.to_string())
    }
}

/// What a handler sees besides its inputs.
pub struct MethodContext<'a> {
    pub method: &'a str,
    pub variables: &'a VariableStore,
}

pub type HandlerResult = std::result::Result<Vec<Variant>, HandlerFault>;

pub type MethodHandler = Arc<dyn Fn(&MethodContext<'_>, &[Variant]) -> HandlerResult + Send + Sync>;

/// Outputs of a method following the `{status: Byte, message: String}`
/// convention.
pub fn status_outputs(status: u8, message: impl Into<String>) -> Vec<Variant> {
    vec![Variant::Byte(status), Variant::String(message.into())]
}

pub fn status_arguments() -> Vec<Argument> {
    vec![
        Argument::scalar("status", DataType::Byte),
        Argument::scalar("message", DataType::String),
    ]
}

#[derive(Clone)]
pub struct Method {
    name: String,
    description: String,
    inputs: Vec<Argument>,
    outputs: Vec<Argument>,
    failure_prefix: Option<String>,
    handler: MethodHandler,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl Method {
    pub fn builder(name: impl Into<String>) -> MethodBuilder {
        MethodBuilder {
            name: name.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            failure_prefix: None,
            handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn inputs(&self) -> &[Argument] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Argument] {
        &self.outputs
    }

    /// Prefix placed before failure details in status outputs.
    pub fn failure_prefix(&self) -> Option<&str> {
        self.failure_prefix.as_deref()
    }

    /// Whether the output schema is exactly `{status: Byte, message: String}`.
    pub fn reports_status(&self) -> bool {
        matches!(
            self.outputs.as_slice(),
            [status, message]
                if status.data_type == DataType::Byte
                    && status.rank == ValueRank::Scalar
                    && message.data_type == DataType::String
                    && message.rank == ValueRank::Scalar
        )
    }

    /// Status outputs describing a failure, with the failure prefix applied.
    pub fn failure_outputs(&self, detail: &str) -> Vec<Variant> {
        match &self.failure_prefix {
            Some(prefix) => status_outputs(1, format!("{prefix}: {detail}")),
            None => status_outputs(1, detail),
        }
    }

    pub(crate) fn call(&self, ctx: &MethodContext<'_>, inputs: &[Variant]) -> HandlerResult {
        (self.handler)(ctx, inputs)
    }
}

fn validate_arguments(method: &str, kind: &str, args: &[Argument]) -> Result<()> {
    let mut seen = HashSet::new();
    for arg in args {
        if arg.name.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "method '{method}' has an unnamed {kind} argument"
            )));
        }
        if !seen.insert(arg.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "method '{method}' declares {kind} argument '{}' twice",
                arg.name
            )));
        }
        if !arg.data_type.is_declarable() {
            return Err(Error::InvalidSchema(format!(
                "method '{method}' {kind} argument '{}' has unsupported type {}",
                arg.name, arg.data_type
            )));
        }
    }
    Ok(())
}

pub struct MethodBuilder {
    name: String,
    description: String,
    inputs: Vec<Argument>,
    outputs: Vec<Argument>,
    failure_prefix: Option<String>,
    handler: Option<MethodHandler>,
}

impl MethodBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, arg: Argument) -> Self {
        self.inputs.push(arg);
        self
    }

    pub fn inputs<I: IntoIterator<Item = Argument>>(mut self, args: I) -> Self {
        self.inputs.extend(args);
        self
    }

    pub fn output(mut self, arg: Argument) -> Self {
        self.outputs.push(arg);
        self
    }

    /// Declare the `{status: Byte, message: String}` outputs.
    pub fn status_outputs(mut self) -> Self {
        self.outputs = status_arguments();
        self
    }

    pub fn failure_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.failure_prefix = Some(prefix.into());
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&MethodContext<'_>, &[Variant]) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }
}

impl Builder for MethodBuilder {
    type Output = Method;

    fn build(self) -> Result<Method> {
        if self.name.is_empty() {
            return Err(Error::InvalidSchema("method name is empty".into()));
        }
        validate_arguments(&self.name, "input", &self.inputs)?;
        validate_arguments(&self.name, "output", &self.outputs)?;
        let handler = self.handler.ok_or_else(|| {
            Error::InvalidSchema(format!("method '{}' has no handler", self.name))
        })?;
        Ok(Method {
            name: self.name,
            description: self.description,
            inputs: self.inputs,
            outputs: self.outputs,
            failure_prefix: self.failure_prefix,
            handler,
        })
    }
}

#[derive(Default)]
struct RegistryInner {
    methods: HashMap<String, Arc<Method>>,
    order: Vec<String>,
}

/// Name-keyed table of methods.
#[derive(Default)]
pub struct MethodRegistry {
    inner: RwLock<RegistryInner>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, method: Method) -> Result<()> {
        validate_arguments(&method.name, "input", &method.inputs)?;
        validate_arguments(&method.name, "output", &method.outputs)?;

        let mut inner = self.inner.write();
        if inner.methods.contains_key(&method.name) {
            return Err(Error::DuplicateName(method.name));
        }
        debug!(
            "[METHODS] Registered method: name={}, inputs={}, outputs={}",
            method.name,
            method.inputs.len(),
            method.outputs.len()
        );
        inner.order.push(method.name.clone());
        inner.methods.insert(method.name.clone(), Arc::new(method));
        Ok(())
    }

    /// Replace the input schema of a registered method.
    ///
    /// Calls already dispatched keep the schema they were validated against.
    pub fn set_inputs(&self, name: &str, inputs: Vec<Argument>) -> Result<()> {
        validate_arguments(name, "input", &inputs)?;
        let mut inner = self.inner.write();
        let current = inner
            .methods
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let mut updated = Method::clone(current);
        updated.inputs = inputs;
        info!(
            "[METHODS] Redeclared inputs of '{}': {} arguments",
            name,
            updated.inputs.len()
        );
        inner.methods.insert(name.to_string(), Arc::new(updated));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Method>> {
        self.inner.read().methods.get(name).cloned()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
