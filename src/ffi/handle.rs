//! Owned and borrowed handles to interpreter objects
//!
//! `OwnedHandle` holds one strong reference and gives it back exactly once:
//! on drop, through `release`, or by handing the raw pointer to an API that
//! steals it (`into_raw`). `BorrowedHandle` is a plain borrow with no
//! release obligation, so the borrow checker keeps it from outliving the
//! reference that backs it.

use super::ledger;
use crate::errors::take_cause;
use pyo3::ffi;
use pyo3::prelude::*;
use std::fmt;
use tracing::trace;

/// Strong reference owned by this side of the boundary
pub struct OwnedHandle<'py> {
    obj: Bound<'py, PyAny>,
}

impl<'py> OwnedHandle<'py> {
    /// Take ownership of an object pyo3 already holds a strong reference to.
    pub fn new(obj: Bound<'py, PyAny>) -> Self {
        ledger::record_acquire();
        trace!(target: "ffi", ptr = ?obj.as_ptr(), "handle acquired");
        Self { obj }
    }

    /// Wrap a new reference returned by the C API.
    ///
    /// On NULL the pending exception is fetched and cleared, and its
    /// rendering is returned so callers can fold it into their own error.
    ///
    /// # Safety
    /// `ptr` must be NULL or a new (owned) reference, and the GIL must be
    /// held as witnessed by `py`.
    pub unsafe fn from_owned_ptr_or_err(
        py: Python<'py>,
        ptr: *mut ffi::PyObject,
    ) -> std::result::Result<Self, String> {
        match Bound::from_owned_ptr_or_opt(py, ptr) {
            Some(obj) => Ok(Self::new(obj)),
            None => Err(take_cause(py)),
        }
    }

    #[inline]
    pub fn py(&self) -> Python<'py> {
        self.obj.py()
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::PyObject {
        self.obj.as_ptr()
    }

    #[inline]
    pub fn as_bound(&self) -> &Bound<'py, PyAny> {
        &self.obj
    }

    #[inline]
    pub fn borrow(&self) -> BorrowedHandle<'_, 'py> {
        BorrowedHandle { obj: &self.obj }
    }

    /// Hand the reference to an API that steals it (`PyTuple_SetItem`,
    /// `PyList_SetItem`). The ledger treats it as released here.
    pub fn into_raw(self) -> *mut ffi::PyObject {
        let raw = self.obj.clone().into_ptr();
        drop(self);
        raw
    }

    pub fn refcount(&self) -> isize {
        self.obj.get_refcnt()
    }
}

impl Drop for OwnedHandle<'_> {
    fn drop(&mut self) {
        ledger::record_release();
        trace!(target: "ffi", ptr = ?self.obj.as_ptr(), "handle released");
    }
}

impl fmt::Debug for OwnedHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("ptr", &self.obj.as_ptr())
            .finish()
    }
}

/// Reference whose release obligation stays with someone else
#[derive(Clone, Copy)]
pub struct BorrowedHandle<'a, 'py> {
    obj: &'a Bound<'py, PyAny>,
}

impl<'a, 'py> BorrowedHandle<'a, 'py> {
    #[inline]
    pub fn py(&self) -> Python<'py> {
        self.obj.py()
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::PyObject {
        self.obj.as_ptr()
    }

    #[inline]
    pub fn as_bound(&self) -> &'a Bound<'py, PyAny> {
        self.obj
    }
}

impl<'a, 'py, T> From<&'a Bound<'py, T>> for BorrowedHandle<'a, 'py> {
    fn from(obj: &'a Bound<'py, T>) -> Self {
        Self { obj: obj.as_any() }
    }
}

impl fmt::Debug for BorrowedHandle<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BorrowedHandle")
            .field("ptr", &self.obj.as_ptr())
            .finish()
    }
}

/// Take a new strong reference so the object can outlive its lender.
#[inline]
pub fn acquire<'py>(handle: BorrowedHandle<'_, 'py>) -> OwnedHandle<'py> {
    OwnedHandle::new(handle.obj.clone())
}

/// Give a strong reference back. `None` is a no-op, which keeps cleanup
/// paths free of checks for handles that were never allocated.
#[inline]
pub fn release(handle: Option<OwnedHandle<'_>>) {
    drop(handle);
}
