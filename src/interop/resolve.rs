//! Symbol resolution - `import module; getattr(module, attribute)`
//!
//! Every intermediate reference (the module name string, the module
//! itself) is owned only inside `resolve` and is released before it
//! returns, on success and on failure alike.

use crate::errors::{BridgeError, Result, TextRole};
use crate::ffi::OwnedHandle;
use pyo3::ffi;
use pyo3::Python;
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::fmt;
use tracing::{debug, trace};

/// Two-part name of an object exposed by a Python module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    pub module: String,
    pub attribute: String,
}

impl SymbolRef {
    pub fn new(module: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            attribute: attribute.into(),
        }
    }

    /// Parse `package.module:attribute` or `module.attribute`.
    ///
    /// The colon form is required when the module path itself is dotted.
    pub fn parse(path: &str) -> Option<Self> {
        let (module, attribute) = match path.split_once(':') {
            Some(parts) => parts,
            None => path.rsplit_once('.')?,
        };
        if module.is_empty() || attribute.is_empty() {
            return None;
        }
        Some(Self::new(module, attribute))
    }

    pub fn resolve<'py>(&self, py: Python<'py>) -> Result<OwnedHandle<'py>> {
        resolve(py, &self.module, &self.attribute)
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.attribute)
    }
}

/// Resolve `attribute` on `module`, importing the module if needed.
///
/// The returned handle is owned by the caller. On failure nothing
/// allocated here survives and the interpreter's error indicator is clear.
pub fn resolve<'py>(py: Python<'py>, module: &str, attribute: &str) -> Result<OwnedHandle<'py>> {
    let attr_name = c_text(attribute, TextRole::Attribute)?;
    let module_obj = import(py, module)?;

    // SAFETY: module_obj is live, attr_name is NUL-terminated.
    let found = unsafe {
        OwnedHandle::from_owned_ptr_or_err(
            py,
            ffi::PyObject_GetAttrString(module_obj.as_ptr(), attr_name.as_ptr()),
        )
    };
    drop(module_obj);

    found.map_err(|cause| {
        debug!(target: "interop", module, attribute, %cause, "attribute lookup failed");
        BridgeError::Resolution {
            module: module.to_string(),
            attribute: Some(attribute.to_string()),
            cause,
        }
    })
}

/// Import `module` (dotted names yield the leaf module) as an owned handle.
pub fn import<'py>(py: Python<'py>, module: &str) -> Result<OwnedHandle<'py>> {
    let module_name = module_text(py, module)?;

    // SAFETY: module_name is a live str and the GIL is held.
    let imported = unsafe {
        OwnedHandle::from_owned_ptr_or_err(py, ffi::PyImport_Import(module_name.as_ptr()))
    };
    drop(module_name);

    let module_obj = imported.map_err(|cause| {
        debug!(target: "interop", module, %cause, "import failed");
        BridgeError::Resolution {
            module: module.to_string(),
            attribute: None,
            cause,
        }
    })?;
    trace!(target: "interop", module, "module imported");
    Ok(module_obj)
}

/// Convert a module name into an owned Python `str`.
fn module_text<'py>(py: Python<'py>, module: &str) -> Result<OwnedHandle<'py>> {
    // Interior NULs cannot survive the C-string based import machinery.
    // Empty names are left for the interpreter to reject.
    if module.contains('\0') {
        return Err(encoding_error(TextRole::Module, module));
    }

    // SAFETY: pointer and length describe valid UTF-8 owned by `module`.
    unsafe {
        OwnedHandle::from_owned_ptr_or_err(
            py,
            ffi::PyUnicode_FromStringAndSize(module.as_ptr().cast(), module.len() as ffi::Py_ssize_t),
        )
    }
    .map_err(|cause| {
        debug!(target: "interop", module, %cause, "module name rejected by interpreter");
        encoding_error(TextRole::Module, module)
    })
}

fn c_text(text: &str, role: TextRole) -> Result<CString> {
    CString::new(text).map_err(|_| encoding_error(role, text))
}

fn encoding_error(role: TextRole, text: &str) -> BridgeError {
    BridgeError::Encoding {
        role,
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyo3::PyErr;

    #[test]
    fn test_parse_dotted_and_colon_forms() {
        assert_eq!(SymbolRef::parse("scorer.select_pod"), Some(SymbolRef::new("scorer", "select_pod")));
        assert_eq!(
            SymbolRef::parse("os.path:join"),
            Some(SymbolRef::new("os.path", "join"))
        );
        assert_eq!(SymbolRef::parse("a.b.c"), Some(SymbolRef::new("a.b", "c")));
        assert_eq!(SymbolRef::parse("noattr"), None);
        assert_eq!(SymbolRef::parse("mod:"), None);
    }

    #[test]
    fn test_encoding_rejects_interior_nul() {
        Python::with_gil(|py| {
            let err = resolve(py, "ma\0th", "sqrt").unwrap_err();
            assert!(matches!(err, BridgeError::Encoding { role: TextRole::Module, .. }));

            let err = resolve(py, "math", "sq\0rt").unwrap_err();
            assert!(matches!(err, BridgeError::Encoding { role: TextRole::Attribute, .. }));
        });
    }

    #[test]
    fn test_empty_names_are_resolution_failures() {
        Python::with_gil(|py| {
            let err = resolve(py, "", "sqrt").unwrap_err();
            match err {
                BridgeError::Resolution { module, attribute, cause } => {
                    assert_eq!(module, "");
                    assert_eq!(attribute, None);
                    assert!(cause.starts_with("ValueError"), "cause was {}", cause);
                }
                other => panic!("expected resolution error, got {:?}", other),
            }

            let err = resolve(py, "math", "").unwrap_err();
            assert!(matches!(
                err,
                BridgeError::Resolution { attribute: Some(ref attr), .. } if attr.is_empty()
            ));
            assert!(!PyErr::occurred(py));
        });
    }
}
