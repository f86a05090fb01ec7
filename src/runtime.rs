//! Embedded interpreter ownership and serialization
//!
//! The interpreter is one process-wide resource. `EmbeddedRuntime` wraps
//! it behind a gate: a `Session` holds the gate and the GIL for the whole
//! resolve/marshal/invoke sequence. The GIL alone is not enough, because
//! CPython drops it periodically while bytecode runs and another native
//! thread could then interleave its own handle traffic.
//!
//! Lock order is GIL first, gate second, and the gate is only ever waited
//! on with the GIL released. A session owner that needs the GIL back can
//! therefore always get it, whichever thread is queued behind it.

use crate::config::RuntimeConfig;
use crate::errors::{describe, BridgeError, Result};
use crate::ffi::OwnedHandle;
use crate::interop::{import, resolve, Resolved, SymbolRef};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use pyo3::prelude::*;
use pyo3::types::PyList;
use tracing::{debug, info};

static RUNTIME: Lazy<EmbeddedRuntime> = Lazy::new(EmbeddedRuntime::new);

#[derive(Debug, Default)]
struct RuntimeState {
    sequences: u64,
    preloaded: Vec<String>,
}

#[derive(Debug)]
pub struct EmbeddedRuntime {
    /// Held for the length of a session
    gate: Mutex<()>,
    /// Bookkeeping only; never held across a GIL or gate acquisition
    state: Mutex<RuntimeState>,
}

impl EmbeddedRuntime {
    fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            state: Mutex::new(RuntimeState::default()),
        }
    }

    /// The single runtime shared by the whole process
    pub fn global() -> &'static EmbeddedRuntime {
        &RUNTIME
    }

    /// Run `f` with exclusive use of the interpreter.
    ///
    /// Safe to call from a thread that already holds the GIL: the GIL is
    /// released while waiting for the gate.
    pub fn session<F, R>(&self, f: F) -> R
    where
        F: for<'py> FnOnce(&mut Session<'py>) -> R,
    {
        Python::with_gil(|py| {
            let _gate = py.allow_threads(|| self.gate.lock());
            let sequence = {
                let mut state = self.state.lock();
                state.sequences += 1;
                state.sequences
            };

            let mut session = Session { py, sequence };
            let out = f(&mut session);
            debug!(target: "runtime", sequence, "session finished");
            out
        })
    }
    /// Number of sessions opened so far
    pub fn sequences(&self) -> u64 {
        self.state.lock().sequences
    }

    /// Apply `sys.path` entries and warm up the listed modules.
    pub fn configure(&self, config: &RuntimeConfig) -> Result<()> {
        self.session(|s| s.extend_sys_path(&config.python_path))?;
        for module in &config.preload {
            self.preload(module)?;
        }
        Ok(())
    }

    /// Import `module` once so the first real call does not pay for it.
    pub fn preload(&self, module: &str) -> Result<()> {
        self.session(|s| s.import(module).map(drop))?;
        let mut state = self.state.lock();
        if !state.preloaded.iter().any(|m| m == module) {
            state.preloaded.push(module.to_string());
        }
        info!(target: "runtime", module, "module preloaded");
        Ok(())
    }

    pub fn preloaded(&self) -> Vec<String> {
        self.state.lock().preloaded.clone()
    }
}

/// Exclusive access to the interpreter for one sequence
pub struct Session<'py> {
    py: Python<'py>,
    sequence: u64,
}

impl<'py> Session<'py> {
    #[inline]
    pub fn py(&self) -> Python<'py> {
        self.py
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn resolve(&self, symbol: &SymbolRef) -> Result<OwnedHandle<'py>> {
        symbol.resolve(self.py)
    }

    /// Start the `Resolved → Marshaled → invoked` pipeline for `symbol`.
    pub fn begin(&self, symbol: &SymbolRef) -> Result<Resolved<'py>> {
        let callable = self.resolve(symbol)?;
        Ok(Resolved::new(symbol.clone(), callable))
    }

    /// Import a module and hand back an owned handle to it.
    pub fn import(&self, module: &str) -> Result<OwnedHandle<'py>> {
        import(self.py, module)
    }

    /// Prepend `entries` to `sys.path`, skipping any already present.
    pub fn extend_sys_path(&self, entries: &[String]) -> Result<()> {
        let sys_error = |e: PyErr| BridgeError::Resolution {
            module: "sys".to_string(),
            attribute: Some("path".to_string()),
            cause: describe(self.py, &e),
        };

        let path = resolve(self.py, "sys", "path")?;
        let path = path.as_bound().downcast::<PyList>().map_err(|e| sys_error(e.into()))?;

        for entry in entries.iter().rev() {
            if path.contains(entry).map_err(sys_error)? {
                continue;
            }
            path.insert(0, entry).map_err(sys_error)?;
            debug!(target: "runtime", entry = %entry, "added to sys.path");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_counted() {
        let runtime = EmbeddedRuntime::new();
        let first = runtime.session(|s| s.sequence());
        let second = runtime.session(|s| s.sequence());
        assert_eq!(second, first + 1);
        assert_eq!(runtime.sequences(), 2);
    }

    #[test]
    fn test_extend_sys_path_is_idempotent() {
        let runtime = EmbeddedRuntime::new();
        let entry = vec!["/nonexistent/pybridge-test-path".to_string()];

        runtime.session(|s| s.extend_sys_path(&entry)).unwrap();
        runtime.session(|s| s.extend_sys_path(&entry)).unwrap();

        let count = runtime.session(|s| {
            let sys = s.py().import_bound("sys").unwrap();
            let path: Vec<String> = sys.getattr("path").unwrap().extract().unwrap();
            path.iter().filter(|p| p.as_str() == entry[0]).count()
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn test_preload_records_module() {
        let runtime = EmbeddedRuntime::new();
        runtime.preload("json").unwrap();
        runtime.preload("json").unwrap();
        assert_eq!(runtime.preloaded(), vec!["json".to_string()]);

        let err = runtime.preload("nonexistent_module").unwrap_err();
        assert!(matches!(err, BridgeError::Resolution { attribute: None, .. }));
    }
}
