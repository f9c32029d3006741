//! Native boundary to the embedded CPython interpreter
//!
//! This module re-exports the subset of the CPython ABI that the runtime
//! relies on, plus a couple of string helpers. Nothing outside this crate
//! should need to reach `pyo3::ffi` directly.
//!
//! Every function here is `unsafe` and, apart from `Py_IsInitialized`,
//! must only be called by a thread that holds the GIL (see [`crate::gil`]).

use crate::error::{Error, Result};
use std::ffi::CString;

#[allow(deprecated)]
pub use pyo3::ffi::PyErr_Fetch;

pub use pyo3::ffi::{
    PyBool_Check, PyBool_FromLong, PyDict_New, PyDict_SetItem, PyDict_Update, PyErr_Clear,
    PyErr_NormalizeException, PyErr_Occurred, PyEval_RestoreThread, PyEval_SaveThread,
    PyFloat_AsDouble, PyFloat_Check, PyFloat_FromDouble, PyGILState_Ensure, PyGILState_Release,
    PyGILState_STATE, PyImport_ImportModule, PyList_Append, PyList_New, PyLong_AsLongLong,
    PyLong_Check, PyLong_FromLongLong, PyObject, PyObject_Call, PyObject_CallNoArgs,
    PyObject_CallOneArg, PyObject_GetAttrString, PyObject_GetItem, PyObject_HasAttrString,
    PyObject_Hash, PyObject_IsTrue, PyObject_Repr, PyObject_RichCompareBool,
    PyObject_SetAttrString, PyObject_Str, PyObject_Type, PyRun_StringFlags, PySequence_Check,
    PySequence_GetItem, PySequence_Size, PySys_GetObject, PyThreadState, PyTuple_New,
    PyTuple_SetItem, PyUnicode_AsUTF8AndSize, PyUnicode_Check, PyUnicode_FromStringAndSize,
    Py_DecRef, Py_False, Py_FinalizeEx, Py_IncRef, Py_InitializeEx, Py_IsInitialized, Py_None,
    Py_True, Py_eval_input, Py_file_input, Py_ssize_t, Py_EQ, Py_GE, Py_GT, Py_LE, Py_LT, Py_NE,
    Py_REFCNT,
};

/// Convert a Rust string into a NUL-terminated C string for the ABI.
///
/// Interior NUL bytes cannot be represented and are reported as an
/// invalid argument rather than silently truncated.
pub(crate) fn c_string(value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::InvalidArgument(format!("string contains a NUL byte: {value:?}")))
}

/// Returns true while the interpreter is initialized.
///
/// Safe to call from any thread without the GIL.
pub fn interpreter_alive() -> bool {
    unsafe { Py_IsInitialized() != 0 }
}
