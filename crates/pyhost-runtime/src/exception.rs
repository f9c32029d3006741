//! Translation of Python exceptions into host errors
//!
//! CPython reports failures by returning null (or -1) and leaving an
//! exception set on the thread state. Whoever observes such a return must
//! fetch and clear the exception before handing control back to anyone
//! else, otherwise an unrelated later call would trip over it. The helpers
//! here do exactly that and turn the exception into a [`PythonError`].

use crate::error::{Error, PythonError, Result};
use crate::ffi;
use crate::gil::Gil;
use crate::object::PyHandle;
use std::os::raw::c_int;
use std::ptr::{self, NonNull};

const UNKNOWN_TYPE: &str = "<unknown>";
const UNPRINTABLE: &str = "<unprintable exception>";

/// Translate the pending Python exception, if any.
///
/// Returns `Ok(())` when no exception is set. Otherwise the exception is
/// fetched, cleared and returned as [`Error::Python`].
pub fn check_and_translate() -> Result<()> {
    let _gil = Gil::acquire();
    if unsafe { ffi::PyErr_Occurred() }.is_null() {
        return Ok(());
    }
    Err(fetch_error())
}

/// Map a `-1` status return to the pending exception.
pub(crate) fn check_status(status: c_int) -> Result<c_int> {
    if status == -1 {
        Err(fetch_error())
    } else {
        Ok(status)
    }
}

/// Fetch and clear the pending exception after an ABI call signalled failure.
///
/// A failure without a pending exception is reported as `SystemError` so
/// callers never receive a half-built result.
#[allow(deprecated)]
pub(crate) fn fetch_error() -> Error {
    let _gil = Gil::acquire();

    let mut exc_type = ptr::null_mut();
    let mut exc_value = ptr::null_mut();
    let mut exc_traceback = ptr::null_mut();
    unsafe {
        ffi::PyErr_Fetch(&mut exc_type, &mut exc_value, &mut exc_traceback);
        if !exc_type.is_null() {
            ffi::PyErr_NormalizeException(&mut exc_type, &mut exc_value, &mut exc_traceback);
        }
    }

    // Own all three parts so they are released on every path. The
    // traceback is not carried across the boundary.
    let exc_type = unsafe { adopt(exc_type) };
    let exc_value = unsafe { adopt(exc_value) };
    let _traceback = unsafe { adopt(exc_traceback) };
    unsafe { ffi::PyErr_Clear() };

    let Some(exc_type) = exc_type else {
        return PythonError::new(
            "SystemError",
            "a Python call failed without setting an exception",
        )
        .into();
    };

    let type_name = describe_type(&exc_type);
    let message = exc_value.as_ref().map(describe_value).unwrap_or_default();
    PythonError::new(type_name, message).into()
}

impl PythonError {
    /// Translate an exception object, e.g. the one stored on a failed
    /// asyncio task.
    pub fn from_exception(exception: &PyHandle) -> PythonError {
        let type_name = exception
            .get_type()
            .map(|t| describe_type(&t))
            .unwrap_or_else(|_| UNKNOWN_TYPE.to_string());
        PythonError::new(type_name, describe_value(exception))
    }
}

unsafe fn adopt(ptr: *mut ffi::PyObject) -> Option<PyHandle> {
    NonNull::new(ptr).map(|ptr| PyHandle::from_non_null(ptr))
}

// Failures while describing an exception are themselves fetched (and so
// cleared) by the handle methods; only a placeholder survives.

fn describe_type(exc_type: &PyHandle) -> String {
    exc_type
        .get_attr("__name__")
        .and_then(|name| name.str())
        .unwrap_or_else(|_| UNKNOWN_TYPE.to_string())
}

fn describe_value(exc_value: &PyHandle) -> String {
    exc_value
        .str()
        .unwrap_or_else(|_| UNPRINTABLE.to_string())
}
