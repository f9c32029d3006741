//! Calling Python callables
//!
//! Three ABI entry points are used depending on the shape of the call:
//!
//! | arguments                  | entry point            |
//! |----------------------------|------------------------|
//! | none                       | `PyObject_CallNoArgs`  |
//! | one positional             | `PyObject_CallOneArg`  |
//! | anything else, or keywords | `PyObject_Call`        |
//!
//! Intermediate containers (argument tuple, keyword dict, key strings) are
//! held in [`PyHandle`]s, so they are released whether the call succeeds or
//! not.

use crate::error::{Error, Result};
use crate::exception;
use crate::ffi;
use crate::gil::Gil;
use crate::object::PyHandle;

impl PyHandle {
    /// Call `self(*args)`.
    pub fn call(&self, args: &[&PyHandle]) -> Result<PyHandle> {
        let callable = self.live_ptr()?;
        let _gil = Gil::acquire();
        match args {
            [] => unsafe { PyHandle::from_owned_ptr(ffi::PyObject_CallNoArgs(callable)) },
            [arg] => {
                let arg = arg.live_ptr()?;
                unsafe { PyHandle::from_owned_ptr(ffi::PyObject_CallOneArg(callable, arg)) }
            }
            _ => {
                let positional = build_tuple(args)?;
                unsafe {
                    PyHandle::from_owned_ptr(ffi::PyObject_Call(
                        callable,
                        positional.as_ptr(),
                        std::ptr::null_mut(),
                    ))
                }
            }
        }
    }

    /// Call `self()`.
    pub fn call0(&self) -> Result<PyHandle> {
        self.call(&[])
    }

    /// Call `self(*positional, **extra_keywords, name=value, ...)`.
    ///
    /// `keyword_names` and `keyword_values` are paired by index. The
    /// `extra_keywords` mapping is merged first, so an explicit keyword
    /// overrides an entry of the same name in the mapping.
    pub fn call_with_keywords(
        &self,
        positional: &[&PyHandle],
        keyword_names: &[&str],
        keyword_values: &[&PyHandle],
        extra_keywords: Option<&PyHandle>,
    ) -> Result<PyHandle> {
        if keyword_names.len() != keyword_values.len() {
            return Err(Error::InvalidArgument(format!(
                "{} keyword names but {} keyword values",
                keyword_names.len(),
                keyword_values.len()
            )));
        }
        if keyword_names.is_empty() && extra_keywords.is_none() {
            return self.call(positional);
        }

        let callable = self.live_ptr()?;
        let _gil = Gil::acquire();
        let positional = build_tuple(positional)?;
        let keywords = unsafe { PyHandle::from_owned_ptr(ffi::PyDict_New())? };

        if let Some(extra) = extra_keywords {
            let extra = extra.live_ptr()?;
            exception::check_status(unsafe { ffi::PyDict_Update(keywords.as_ptr(), extra) })?;
        }
        for (name, value) in keyword_names.iter().zip(keyword_values) {
            let value = value.live_ptr()?;
            let key = unsafe {
                PyHandle::from_owned_ptr(ffi::PyUnicode_FromStringAndSize(
                    name.as_ptr().cast(),
                    name.len() as ffi::Py_ssize_t,
                ))?
            };
            exception::check_status(unsafe {
                ffi::PyDict_SetItem(keywords.as_ptr(), key.as_ptr(), value)
            })?;
        }

        unsafe {
            PyHandle::from_owned_ptr(ffi::PyObject_Call(
                callable,
                positional.as_ptr(),
                keywords.as_ptr(),
            ))
        }
    }

    /// Call the method `name` on `self` with positional arguments.
    pub fn call_method(&self, name: &str, args: &[&PyHandle]) -> Result<PyHandle> {
        self.get_attr(name)?.call(args)
    }
}

/// Build a tuple holding new references to `items`. Caller holds the GIL.
fn build_tuple(items: &[&PyHandle]) -> Result<PyHandle> {
    let tuple =
        unsafe { PyHandle::from_owned_ptr(ffi::PyTuple_New(items.len() as ffi::Py_ssize_t))? };
    for (index, item) in items.iter().enumerate() {
        let item = item.live_ptr()?;
        unsafe {
            // PyTuple_SetItem steals the reference, even when it fails.
            ffi::Py_IncRef(item);
            let status = ffi::PyTuple_SetItem(tuple.as_ptr(), index as ffi::Py_ssize_t, item);
            exception::check_status(status)?;
        }
    }
    Ok(tuple)
}
