//! Interpreter-side leak checks.
//!
//! Kept to a single test in its own binary: `sys.getallocatedblocks()` is
//! process wide, so no other test thread may allocate while it is sampled.

use pybridge::ffi::live_handles;
use pybridge::interop::{marshal_with, FieldConverter, NativeConverter};
use pybridge::{resolve, BridgeError, FieldValue, MetricsRecord, OwnedHandle};
use pyo3::prelude::*;

const ROUNDS: isize = 200;

/// Native conversion that gives up on the last field, after the first
/// three objects have been created and staged.
struct FailLastField;

impl FieldConverter for FailLastField {
    fn convert<'py>(
        &self,
        py: Python<'py>,
        index: usize,
        value: FieldValue<'_>,
    ) -> Result<OwnedHandle<'py>, String> {
        if index == 3 {
            return Err("out of queue slots".to_string());
        }
        NativeConverter.convert(py, index, value)
    }
}

/// Blocks the interpreter holds after a full collection
fn allocated_blocks(py: Python<'_>) -> isize {
    py.import_bound("gc").unwrap().call_method0("collect").unwrap();
    py.import_bound("sys")
        .unwrap()
        .call_method0("getallocatedblocks")
        .unwrap()
        .extract()
        .unwrap()
}

/// Run `step` `ROUNDS` times after a warm-up and return the block growth.
fn growth(py: Python<'_>, mut step: impl FnMut()) -> isize {
    for _ in 0..10 {
        step();
    }
    let before = allocated_blocks(py);
    for _ in 0..ROUNDS {
        step();
    }
    allocated_blocks(py) - before
}

#[test]
fn test_failures_do_not_grow_the_interpreter_heap() {
    Python::with_gil(|py| {
        let live = live_handles();

        // One leaked reference per failure would grow the heap by at least
        // ROUNDS blocks; caches settling during the loop stay far below that.
        let grown = growth(py, || {
            let err = resolve(py, "nonexistent_module", "f").unwrap_err();
            assert!(matches!(err, BridgeError::Resolution { attribute: None, .. }));
        });
        assert!(grown < ROUNDS / 10, "failed imports grew the heap by {} blocks", grown);

        let grown = growth(py, || {
            let err = resolve(py, "json", "no_such_attribute").unwrap_err();
            assert!(matches!(err, BridgeError::Resolution { attribute: Some(_), .. }));
        });
        assert!(grown < ROUNDS / 10, "failed lookups grew the heap by {} blocks", grown);

        // Large values keep the int and float out of the small-object caches
        let record = MetricsRecord::new("pod-leak-check", 1 << 40, 0.123_456, 1 << 41);
        let grown = growth(py, || {
            let err = marshal_with(py, &record, &FailLastField).unwrap_err();
            assert!(matches!(err, BridgeError::Marshal { field_index: 3, .. }));
        });
        assert!(grown < ROUNDS / 10, "failed marshals grew the heap by {} blocks", grown);

        assert_eq!(live_handles(), live);
        assert!(!PyErr::occurred(py));
    });
}
