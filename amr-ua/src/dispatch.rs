//! Method invocation.
//!
//! Failures are reported on two levels. Structural problems with a call
//! (unknown method, wrong argument count, unconvertible argument) fail the
//! call with a [`CallFailure`]. Faults raised by the handler itself are
//! reported through the `{status, message}` outputs when the method declares
//! them, and as a [`CallFailure`] otherwise.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::convert::convert;
use crate::error::Error;
use crate::method::{HandlerFault, Method, MethodContext};
use crate::space::AddressSpace;
use crate::value::Variant;

/// A failed call: the error plus whatever outputs are returned to the caller.
///
/// Methods using the status convention get `(1, message)` outputs even for
/// dispatch-level failures; for other methods `outputs` is empty.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct CallFailure {
    pub error: Error,
    pub outputs: Vec<Variant>,
}

impl CallFailure {
    fn bare(error: Error) -> Self {
        Self {
            error,
            outputs: Vec::new(),
        }
    }

    fn for_method(method: &Method, error: Error) -> Self {
        let outputs = if method.reports_status() {
            method.failure_outputs(&error.to_string())
        } else {
            Vec::new()
        };
        Self { error, outputs }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    space: Arc<AddressSpace>,
}

impl Dispatcher {
    pub fn new(space: Arc<AddressSpace>) -> Self {
        Self { space }
    }

    pub fn space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    /// Validate, convert and run a call.
    #[tracing::instrument(name = "invoke", skip(self, inputs), fields(inputs = inputs.len()))]
    pub fn invoke(&self, name: &str, inputs: &[Variant]) -> Result<Vec<Variant>, CallFailure> {
        let method = self
            .space
            .methods()
            .get(name)
            .ok_or_else(|| CallFailure::bare(Error::NotFound(name.to_string())))?;

        let schema = method.inputs();
        if inputs.len() != schema.len() {
            let error = Error::ArityMismatch {
                method: name.to_string(),
                expected: schema.len(),
                actual: inputs.len(),
            };
            debug!("[DISPATCH] {}", error);
            return Err(CallFailure::for_method(&method, error));
        }

        let converted = inputs
            .iter()
            .zip(schema)
            .enumerate()
            .map(|(index, (value, arg))| {
                convert(value, arg.data_type, arg.rank).map_err(|detail| Error::Conversion {
                    index,
                    expected_type: arg.data_type,
                    expected_rank: arg.rank,
                    detail,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| {
                debug!("[DISPATCH] {}: {}", name, error);
                CallFailure::for_method(&method, error)
            })?;

        let ctx = MethodContext {
            method: name,
            variables: self.space.variables(),
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| method.call(&ctx, &converted)))
            .unwrap_or_else(|payload| Err(HandlerFault(panic_message(payload))))
            .map_err(|fault| fault.0)
            .and_then(|outputs| check_outputs(&method, outputs));

        match outcome {
            Ok(outputs) => {
                debug!("[DISPATCH] {} completed", name);
                Ok(outputs)
            }
            Err(detail) => {
                warn!("[DISPATCH] Handler fault in {}: {}", name, detail);
                if method.reports_status() {
                    Ok(method.failure_outputs(&detail))
                } else {
                    Err(CallFailure::bare(Error::HandlerFault(detail)))
                }
            }
        }
    }
}

fn check_outputs(method: &Method, outputs: Vec<Variant>) -> Result<Vec<Variant>, String> {
    let schema = method.outputs();
    if outputs.len() != schema.len() {
        return Err(format!(
            "handler returned {} outputs, expected {}",
            outputs.len(),
            schema.len()
        ));
    }
    for (i, (value, arg)) in outputs.iter().zip(schema).enumerate() {
        if !value.conforms_to(arg.data_type, arg.rank) {
            return Err(format!(
                "output {i} ({}) is {}, expected {}",
                arg.name,
                value.type_name(),
                arg.data_type
            ));
        }
    }
    Ok(outputs)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
