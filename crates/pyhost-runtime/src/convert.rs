//! Conversion between host values and Python objects
//!
//! [`ToPython`] builds a new Python object from a host value and
//! [`FromPython`] reads one back. Conversions are strict: a Python `float`
//! does not silently become an `i64`, a `bool` is not an integer, and a
//! `str` is not accepted as a sequence of characters.

use crate::error::{Error, Result};
use crate::exception;
use crate::ffi;
use crate::gil::Gil;
use crate::object::{utf8, PyHandle};

/// Host values that can be turned into a Python object
pub trait ToPython {
    /// Build a new Python object holding this value
    fn to_python(&self) -> Result<PyHandle>;
}

/// Host types that can be read from a Python object
pub trait FromPython: Sized {
    /// Read a value of this type from `object`
    fn from_python(object: &PyHandle) -> Result<Self>;
}

impl PyHandle {
    /// Convert this object into a host value.
    ///
    /// ```ignore
    /// let answer: i64 = env.eval("6 * 7")?.extract()?;
    /// ```
    pub fn extract<T: FromPython>(&self) -> Result<T> {
        T::from_python(self)
    }
}

fn mismatch(expected: &str, object: &PyHandle) -> Error {
    Error::Conversion {
        expected: expected.to_string(),
        actual: object
            .type_name()
            .unwrap_or_else(|_| "<unknown>".to_string()),
    }
}

// ============================================================================
// Host -> Python
// ============================================================================

impl ToPython for i64 {
    fn to_python(&self) -> Result<PyHandle> {
        let _gil = Gil::acquire();
        unsafe { PyHandle::from_owned_ptr(ffi::PyLong_FromLongLong(*self)) }
    }
}

impl ToPython for i32 {
    fn to_python(&self) -> Result<PyHandle> {
        i64::from(*self).to_python()
    }
}

impl ToPython for usize {
    fn to_python(&self) -> Result<PyHandle> {
        let value = i64::try_from(*self)
            .map_err(|_| Error::InvalidArgument(format!("{self} does not fit in i64")))?;
        value.to_python()
    }
}

impl ToPython for f64 {
    fn to_python(&self) -> Result<PyHandle> {
        let _gil = Gil::acquire();
        unsafe { PyHandle::from_owned_ptr(ffi::PyFloat_FromDouble(*self)) }
    }
}

impl ToPython for bool {
    fn to_python(&self) -> Result<PyHandle> {
        Ok(PyHandle::bool(*self))
    }
}

impl ToPython for str {
    fn to_python(&self) -> Result<PyHandle> {
        let _gil = Gil::acquire();
        unsafe {
            PyHandle::from_owned_ptr(ffi::PyUnicode_FromStringAndSize(
                self.as_ptr().cast(),
                self.len() as ffi::Py_ssize_t,
            ))
        }
    }
}

impl ToPython for String {
    fn to_python(&self) -> Result<PyHandle> {
        self.as_str().to_python()
    }
}

impl ToPython for () {
    fn to_python(&self) -> Result<PyHandle> {
        Ok(PyHandle::none())
    }
}

impl<T: ToPython> ToPython for Option<T> {
    fn to_python(&self) -> Result<PyHandle> {
        match self {
            Some(value) => value.to_python(),
            None => Ok(PyHandle::none()),
        }
    }
}

impl<T: ToPython> ToPython for [T] {
    fn to_python(&self) -> Result<PyHandle> {
        let _gil = Gil::acquire();
        let list = unsafe { PyHandle::from_owned_ptr(ffi::PyList_New(0))? };
        for item in self {
            let item = item.to_python()?;
            // PyList_Append takes its own reference.
            exception::check_status(unsafe { ffi::PyList_Append(list.as_ptr(), item.as_ptr()) })?;
        }
        Ok(list)
    }
}

impl<T: ToPython> ToPython for Vec<T> {
    fn to_python(&self) -> Result<PyHandle> {
        self.as_slice().to_python()
    }
}

impl ToPython for PyHandle {
    fn to_python(&self) -> Result<PyHandle> {
        self.clone_ref()
    }
}

impl<T: ToPython + ?Sized> ToPython for &T {
    fn to_python(&self) -> Result<PyHandle> {
        (**self).to_python()
    }
}

// ============================================================================
// Python -> Host
// ============================================================================

impl FromPython for i64 {
    fn from_python(object: &PyHandle) -> Result<Self> {
        let ptr = object.live_ptr()?;
        let _gil = Gil::acquire();
        // bool subclasses int in Python; not here.
        if unsafe { ffi::PyLong_Check(ptr) } == 0 || unsafe { ffi::PyBool_Check(ptr) } != 0 {
            return Err(mismatch("int", object));
        }
        let value = unsafe { ffi::PyLong_AsLongLong(ptr) };
        if value == -1 && !unsafe { ffi::PyErr_Occurred() }.is_null() {
            // OverflowError for ints outside the i64 range.
            return Err(exception::fetch_error());
        }
        Ok(value)
    }
}

impl FromPython for i32 {
    fn from_python(object: &PyHandle) -> Result<Self> {
        let value = i64::from_python(object)?;
        i32::try_from(value).map_err(|_| Error::Conversion {
            expected: "i32".to_string(),
            actual: format!("int {value}"),
        })
    }
}

impl FromPython for f64 {
    fn from_python(object: &PyHandle) -> Result<Self> {
        let ptr = object.live_ptr()?;
        let _gil = Gil::acquire();
        // Ints widen to float, as they do in Python arithmetic.
        let numeric = unsafe { ffi::PyFloat_Check(ptr) } != 0
            || (unsafe { ffi::PyLong_Check(ptr) } != 0 && unsafe { ffi::PyBool_Check(ptr) } == 0);
        if !numeric {
            return Err(mismatch("float", object));
        }
        let value = unsafe { ffi::PyFloat_AsDouble(ptr) };
        if value == -1.0 && !unsafe { ffi::PyErr_Occurred() }.is_null() {
            return Err(exception::fetch_error());
        }
        Ok(value)
    }
}

impl FromPython for bool {
    fn from_python(object: &PyHandle) -> Result<Self> {
        let ptr = object.live_ptr()?;
        let _gil = Gil::acquire();
        if unsafe { ffi::PyBool_Check(ptr) } == 0 {
            return Err(mismatch("bool", object));
        }
        object.is_truthy()
    }
}

impl FromPython for String {
    fn from_python(object: &PyHandle) -> Result<Self> {
        let ptr = object.live_ptr()?;
        let _gil = Gil::acquire();
        if unsafe { ffi::PyUnicode_Check(ptr) } == 0 {
            return Err(mismatch("str", object));
        }
        unsafe { utf8(ptr) }
    }
}

impl FromPython for () {
    fn from_python(object: &PyHandle) -> Result<Self> {
        if object.is_none() {
            Ok(())
        } else {
            Err(mismatch("None", object))
        }
    }
}

impl<T: FromPython> FromPython for Option<T> {
    fn from_python(object: &PyHandle) -> Result<Self> {
        if object.is_none() {
            Ok(None)
        } else {
            T::from_python(object).map(Some)
        }
    }
}

impl<T: FromPython> FromPython for Vec<T> {
    fn from_python(object: &PyHandle) -> Result<Self> {
        let ptr = object.live_ptr()?;
        let _gil = Gil::acquire();
        let is_sequence = unsafe { ffi::PySequence_Check(ptr) } == 1;
        let is_str = unsafe { ffi::PyUnicode_Check(ptr) } != 0;
        if !is_sequence || is_str {
            return Err(mismatch("sequence", object));
        }
        let len = unsafe { ffi::PySequence_Size(ptr) };
        if len < 0 {
            return Err(exception::fetch_error());
        }
        let mut items = Vec::with_capacity(len as usize);
        for index in 0..len {
            let item = unsafe { PyHandle::from_owned_ptr(ffi::PySequence_GetItem(ptr, index))? };
            items.push(T::from_python(&item)?);
        }
        Ok(items)
    }
}

impl FromPython for PyHandle {
    fn from_python(object: &PyHandle) -> Result<Self> {
        object.clone_ref()
    }
}
