//! Error taxonomy for the bridge
//!
//! Every variant carries enough native context (module, attribute, field
//! index) to name the failing step without consulting the interpreter.
//! Python exceptions are rendered to text at the boundary, so no `PyErr`
//! and no interpreter error state ever travels inside a `BridgeError`.

use pyo3::{PyErr, Python};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which piece of native text failed to cross into the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    Module,
    Attribute,
}

impl fmt::Display for TextRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => f.write_str("module name"),
            Self::Attribute => f.write_str("attribute name"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cannot encode {role} {text:?} as a Python string")]
    Encoding { role: TextRole, text: String },

    #[error("cannot resolve {}: {cause}", display_symbol(.module, .attribute))]
    Resolution {
        module: String,
        attribute: Option<String>,
        cause: String,
    },

    #[error("cannot marshal field {field_index} ({field}){}: {cause}", display_record(.record))]
    Marshal {
        record: Option<usize>,
        field_index: usize,
        field: &'static str,
        cause: String,
    },

    #[error("call to {symbol} failed: {cause}")]
    Invocation { symbol: String, cause: String },

    #[error("handle ledger out of balance: {outstanding} handle(s) outstanding")]
    LeakInvariantViolation { outstanding: isize },

    #[error("cannot decode result item {index}: {cause}")]
    Decode { index: usize, cause: String },

    #[error("cannot serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("call to {symbol} did not finish within {after:?}")]
    Timeout { symbol: String, after: Duration },

    #[error("worker thread for {symbol} exited without a result")]
    Worker { symbol: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

fn display_symbol(module: &str, attribute: &Option<String>) -> String {
    match attribute {
        Some(attr) => format!("{}.{}", module, attr),
        None => format!("module {}", module),
    }
}

fn display_record(record: &Option<usize>) -> String {
    match record {
        Some(index) => format!(" of record {}", index),
        None => String::new(),
    }
}

/// Render an exception as `Type: message`.
///
/// The exception has already been taken out of the interpreter by the
/// time it reaches here, so formatting cannot disturb the error indicator.
pub(crate) fn describe(py: Python<'_>, err: &PyErr) -> String {
    use pyo3::types::{PyAnyMethods, PyTypeMethods};

    let ty = err
        .get_type_bound(py)
        .qualname()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "<exception>".to_string());
    let msg = err
        .value_bound(py)
        .str()
        .map(|s| s.to_string())
        .unwrap_or_default();
    // str() on a hostile exception can raise; nothing may stay pending
    let _ = PyErr::take(py);

    if msg.is_empty() {
        ty
    } else {
        format!("{}: {}", ty, msg)
    }
}

/// Take whatever exception is pending, or explain that none was set.
pub(crate) fn take_cause(py: Python<'_>) -> String {
    match PyErr::take(py) {
        Some(err) => describe(py, &err),
        None => "NULL returned without an exception set".to_string(),
    }
}
