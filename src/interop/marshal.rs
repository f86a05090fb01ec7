//! Struct marshaling - `MetricsRecord` → `dict`
//!
//! Design: convert every field first, insert second.
//! - Converted fields are staged in an `AggregateBuilder`, which owns them
//! - Any conversion failure drops the builder and with it every staged handle
//! - Only when all fields converted is the dict created and filled
//! - Keys are interned once per interpreter and only ever borrowed

use crate::errors::{take_cause, BridgeError, Result};
use crate::ffi::{BorrowedHandle, OwnedHandle};
use crate::metrics::{FieldValue, MetricsRecord, FIELD_NAMES};
use pyo3::{ffi, intern, Python};
use smallvec::SmallVec;
use tracing::{debug, trace};

/// Converts one native field into an owned interpreter object.
///
/// On failure the interpreter's error indicator must be clear and the
/// returned text describes the cause.
pub trait FieldConverter {
    fn convert<'py>(
        &self,
        py: Python<'py>,
        index: usize,
        value: FieldValue<'_>,
    ) -> std::result::Result<OwnedHandle<'py>, String>;
}

/// Converter backed directly by the CPython object constructors
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConverter;

impl FieldConverter for NativeConverter {
    fn convert<'py>(
        &self,
        py: Python<'py>,
        _index: usize,
        value: FieldValue<'_>,
    ) -> std::result::Result<OwnedHandle<'py>, String> {
        // SAFETY: every constructor returns a new reference or NULL with an
        // exception set, and the GIL is held.
        unsafe {
            let ptr = match value {
                FieldValue::Text(text) => ffi::PyUnicode_FromStringAndSize(
                    text.as_ptr().cast(),
                    text.len() as ffi::Py_ssize_t,
                ),
                FieldValue::Int(v) => ffi::PyLong_FromLongLong(v),
                FieldValue::Float(v) => ffi::PyFloat_FromDouble(v),
            };
            OwnedHandle::from_owned_ptr_or_err(py, ptr)
        }
    }
}

/// Interned dict key for field `index`, or `None` past the last field
pub fn field_key(py: Python<'_>, index: usize) -> Option<BorrowedHandle<'_, '_>> {
    let key = match index {
        0 => intern!(py, "pod_name"),
        1 => intern!(py, "adapter_count"),
        2 => intern!(py, "kv_cache_util"),
        3 => intern!(py, "queue_count"),
        _ => return None,
    };
    Some(BorrowedHandle::from(key))
}

/// Staging area for the fields of one aggregate
pub struct AggregateBuilder<'py> {
    py: Python<'py>,
    record: Option<usize>,
    staged: SmallVec<[(usize, OwnedHandle<'py>); 4]>,
}

impl<'py> AggregateBuilder<'py> {
    pub fn new(py: Python<'py>) -> Self {
        Self {
            py,
            record: None,
            staged: SmallVec::new(),
        }
    }

    /// Builder for the record at `position` inside a batch
    pub fn for_record(py: Python<'py>, position: usize) -> Self {
        Self {
            record: Some(position),
            ..Self::new(py)
        }
    }

    /// Number of converted fields waiting for insertion
    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    /// Run one conversion and stage its result.
    ///
    /// On failure every previously staged handle is released before the
    /// error is returned.
    pub fn stage_with<F>(&mut self, index: usize, convert: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<OwnedHandle<'py>, String>,
    {
        match convert() {
            Ok(handle) => {
                self.staged.push((index, handle));
                Ok(())
            }
            Err(cause) => {
                let released = self.staged.len();
                self.staged.clear();
                debug!(target: "interop", field_index = index, released, %cause, "field conversion failed");
                Err(marshal_error(self.record, index, cause))
            }
        }
    }

    /// Create the dict and move every staged value into it.
    pub fn finish(self) -> Result<OwnedHandle<'py>> {
        let Self {
            py,
            record,
            mut staged,
        } = self;
        let first = staged.first().map(|(index, _)| *index).unwrap_or(0);

        // SAFETY: PyDict_New returns a new reference or NULL; GIL held.
        let dict = unsafe { OwnedHandle::from_owned_ptr_or_err(py, ffi::PyDict_New()) }
            .map_err(|cause| marshal_error(record, first, cause))?;

        for (index, value) in staged.drain(..) {
            let key = field_key(py, index)
                .ok_or_else(|| marshal_error(record, index, format!("no field at index {}", index)))?;
            // SAFETY: all three objects are live. PyDict_SetItem takes its
            // own references; ours are dropped at the end of the iteration.
            let rc = unsafe { ffi::PyDict_SetItem(dict.as_ptr(), key.as_ptr(), value.as_ptr()) };
            if rc != 0 {
                return Err(marshal_error(record, index, take_cause(py)));
            }
        }

        trace!(target: "interop", record = ?record, "aggregate built");
        Ok(dict)
    }
}

fn marshal_error(record: Option<usize>, field_index: usize, cause: String) -> BridgeError {
    BridgeError::Marshal {
        record,
        field_index,
        field: FIELD_NAMES.get(field_index).copied().unwrap_or("<aggregate>"),
        cause,
    }
}

/// Marshal one record into an owned dict using the native converter.
pub fn marshal<'py>(py: Python<'py>, record: &MetricsRecord) -> Result<OwnedHandle<'py>> {
    marshal_with(py, record, &NativeConverter)
}

pub fn marshal_with<'py, C>(py: Python<'py>, record: &MetricsRecord, converter: &C) -> Result<OwnedHandle<'py>>
where
    C: FieldConverter + ?Sized,
{
    build(AggregateBuilder::new(py), record, converter)
}

fn build<'py, C>(mut builder: AggregateBuilder<'py>, record: &MetricsRecord, converter: &C) -> Result<OwnedHandle<'py>>
where
    C: FieldConverter + ?Sized,
{
    let py = builder.py;
    for (index, value) in record.fields().into_iter().enumerate() {
        builder.stage_with(index, || converter.convert(py, index, value))?;
    }
    builder.finish()
}

/// Marshal a batch into an owned `list[dict]`.
pub fn marshal_batch<'py>(py: Python<'py>, records: &[MetricsRecord]) -> Result<OwnedHandle<'py>> {
    marshal_batch_with(py, records, &NativeConverter)
}

pub fn marshal_batch_with<'py, C>(
    py: Python<'py>,
    records: &[MetricsRecord],
    converter: &C,
) -> Result<OwnedHandle<'py>>
where
    C: FieldConverter + ?Sized,
{
    // SAFETY: PyList_New returns a new reference or NULL; GIL held.
    let list = unsafe {
        OwnedHandle::from_owned_ptr_or_err(py, ffi::PyList_New(records.len() as ffi::Py_ssize_t))
    }
    .map_err(|cause| marshal_error(None, 0, cause))?;

    for (position, record) in records.iter().enumerate() {
        let item = build(AggregateBuilder::for_record(py, position), record, converter)?;
        // SAFETY: position < len(list); PyList_SetItem steals `item` even
        // when it fails. Unfilled slots are NULL and the list tolerates them
        // on deallocation.
        let rc = unsafe { ffi::PyList_SetItem(list.as_ptr(), position as ffi::Py_ssize_t, item.into_raw()) };
        if rc != 0 {
            return Err(marshal_error(Some(position), 0, take_cause(py)));
        }
    }

    debug!(target: "interop", records = records.len(), "batch marshaled");
    Ok(list)
}

/// Serialize a batch to JSON and wrap it in an owned `bytearray`.
pub fn marshal_json<'py>(py: Python<'py>, records: &[MetricsRecord]) -> Result<OwnedHandle<'py>> {
    let payload = serde_json::to_vec(records)?;

    // SAFETY: the buffer is copied before `payload` is dropped; GIL held.
    let bytes = unsafe {
        OwnedHandle::from_owned_ptr_or_err(
            py,
            ffi::PyByteArray_FromStringAndSize(payload.as_ptr().cast(), payload.len() as ffi::Py_ssize_t),
        )
    }
    .map_err(|cause| marshal_error(None, 0, cause))?;

    debug!(target: "interop", records = records.len(), bytes = payload.len(), "batch encoded as JSON");
    Ok(bytes)
}
