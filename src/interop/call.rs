//! Invocation - call a resolved callable with marshaled arguments
//!
//! `invoke` borrows both the callable and its arguments; releasing them is
//! the caller's business. The pipeline types below encode the full
//! sequence `Resolved → Marshaled → invoked` so no step can be skipped and
//! every intermediate handle is released on the way to either outcome.

use super::marshal;
use super::resolve::SymbolRef;
use crate::errors::{take_cause, BridgeError, Result};
use crate::ffi::{acquire, BorrowedHandle, OwnedHandle};
use crate::metrics::MetricsRecord;
use pyo3::ffi;
use pyo3::prelude::*;
use tracing::{debug, debug_span, trace};

/// Call `callable(arg)`.
pub fn invoke<'py>(
    py: Python<'py>,
    callable: BorrowedHandle<'_, 'py>,
    arg: BorrowedHandle<'_, 'py>,
) -> Result<OwnedHandle<'py>> {
    invoke_with(py, callable, &[arg])
}

/// Call `callable(*args)`.
///
/// Inputs are borrowed and left as they were. On failure the pending
/// exception has been taken, so the interpreter's error indicator is clear.
pub fn invoke_with<'py>(
    py: Python<'py>,
    callable: BorrowedHandle<'_, 'py>,
    args: &[BorrowedHandle<'_, 'py>],
) -> Result<OwnedHandle<'py>> {
    call_object(py, callable, args).map_err(|cause| invocation_error(callable_label(callable), cause))
}

fn call_object<'py>(
    py: Python<'py>,
    callable: BorrowedHandle<'_, 'py>,
    args: &[BorrowedHandle<'_, 'py>],
) -> std::result::Result<OwnedHandle<'py>, String> {
    // SAFETY: PyTuple_New returns a new reference or NULL; GIL held.
    let tuple = unsafe { OwnedHandle::from_owned_ptr_or_err(py, ffi::PyTuple_New(args.len() as ffi::Py_ssize_t)) }?;

    for (position, arg) in args.iter().enumerate() {
        // PyTuple_SetItem steals, so hand it a reference of its own
        let owned = acquire(*arg);
        // SAFETY: position < len(tuple) and the tuple is not yet shared.
        let rc = unsafe { ffi::PyTuple_SetItem(tuple.as_ptr(), position as ffi::Py_ssize_t, owned.into_raw()) };
        if rc != 0 {
            return Err(take_cause(py));
        }
    }

    trace!(target: "interop", args = args.len(), "calling");
    // SAFETY: callable and tuple are live; the result is a new reference.
    let result = unsafe {
        OwnedHandle::from_owned_ptr_or_err(py, ffi::PyObject_CallObject(callable.as_ptr(), tuple.as_ptr()))
    };
    drop(tuple);
    result
}

/// `module.qualname` of a bare callable, for error messages
fn callable_label(callable: BorrowedHandle<'_, '_>) -> String {
    let obj = callable.as_bound();
    let part = |name: &str| obj.getattr(name).and_then(|v| v.extract::<String>()).ok();

    match (part("__module__"), part("__qualname__")) {
        (Some(module), Some(qualname)) => format!("{}.{}", module, qualname),
        (None, Some(qualname)) => qualname,
        _ => obj
            .get_type()
            .name()
            .map(|name| format!("<{} object>", name))
            .unwrap_or_else(|_| "<callable>".to_string()),
    }
}

fn invocation_error(symbol: String, cause: String) -> BridgeError {
    debug!(target: "interop", %symbol, %cause, "call raised");
    BridgeError::Invocation { symbol, cause }
}

/// A callable that has been resolved and is waiting for its argument
pub struct Resolved<'py> {
    symbol: SymbolRef,
    callable: OwnedHandle<'py>,
}

impl<'py> Resolved<'py> {
    pub fn resolve(py: Python<'py>, symbol: &SymbolRef) -> Result<Self> {
        let callable = symbol.resolve(py)?;
        Ok(Self::new(symbol.clone(), callable))
    }

    pub fn new(symbol: SymbolRef, callable: OwnedHandle<'py>) -> Self {
        Self { symbol, callable }
    }

    /// Supply an already marshaled argument.
    pub fn with_args(self, args: OwnedHandle<'py>) -> Marshaled<'py> {
        Marshaled {
            symbol: self.symbol,
            callable: self.callable,
            args,
        }
    }

    /// Marshal a single record as the argument (`dict`).
    pub fn marshal(self, record: &MetricsRecord) -> Result<Marshaled<'py>> {
        let args = marshal::marshal(self.callable.py(), record)?;
        Ok(self.with_args(args))
    }

    /// Marshal a batch as the argument (`list[dict]`).
    pub fn marshal_batch(self, records: &[MetricsRecord]) -> Result<Marshaled<'py>> {
        let args = marshal::marshal_batch(self.callable.py(), records)?;
        Ok(self.with_args(args))
    }

    /// Encode a batch as JSON (`bytearray`).
    pub fn marshal_json(self, records: &[MetricsRecord]) -> Result<Marshaled<'py>> {
        let args = marshal::marshal_json(self.callable.py(), records)?;
        Ok(self.with_args(args))
    }
}

/// A callable paired with its argument, ready to run
pub struct Marshaled<'py> {
    symbol: SymbolRef,
    callable: OwnedHandle<'py>,
    args: OwnedHandle<'py>,
}

impl<'py> Marshaled<'py> {
    /// Run the call. Callable and argument are released whatever the outcome.
    pub fn invoke(self) -> Result<OwnedHandle<'py>> {
        let span = debug_span!(target: "interop", "invoke", symbol = %self.symbol);
        let _entered = span.enter();

        let Self { symbol, callable, args } = self;
        let py = callable.py();
        let outcome = call_object(py, callable.borrow(), &[args.borrow()]);
        drop(args);
        drop(callable);

        outcome.map_err(|cause| invocation_error(symbol.to_string(), cause))
    }
}
