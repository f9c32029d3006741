//! Reference-counted handles to Python objects
//!
//! A [`PyHandle`] owns exactly one reference to a Python object. Cloning is
//! explicit ([`PyHandle::clone_ref`]) because it has to bump the foreign
//! refcount under the GIL, and disposal is deterministic: either an explicit
//! [`PyHandle::dispose`] or `Drop`, which re-acquires the GIL before
//! decrementing.
//!
//! # Immortal objects
//!
//! `None`, `True` and `False` are process-wide singletons. Handles to them
//! never touch the refcount: cloning yields another alias and disposal only
//! marks the handle.

use crate::convert::ToPython;
use crate::error::{Error, Result};
use crate::exception;
use crate::ffi;
use crate::gil::Gil;
use once_cell::sync::OnceCell;
use std::cmp::Ordering;
use std::os::raw::c_int;
use std::ptr::NonNull;

/// Addresses of the interpreter's immortal singletons
///
/// These are statics inside libpython, so their addresses stay valid across
/// interpreter re-initialization.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Immortals {
    none: usize,
    true_: usize,
    false_: usize,
}

static IMMORTALS: OnceCell<Immortals> = OnceCell::new();

/// Resolve the immortal singletons, once per process.
pub(crate) fn immortals() -> &'static Immortals {
    IMMORTALS.get_or_init(|| unsafe {
        Immortals {
            none: ffi::Py_None() as usize,
            true_: ffi::Py_True() as usize,
            false_: ffi::Py_False() as usize,
        }
    })
}

impl Immortals {
    fn contains(&self, ptr: *mut ffi::PyObject) -> bool {
        let address = ptr as usize;
        address == self.none || address == self.true_ || address == self.false_
    }

    fn pointer(address: usize) -> NonNull<ffi::PyObject> {
        // Resolved from libpython statics, never null.
        unsafe { NonNull::new_unchecked(address as *mut ffi::PyObject) }
    }
}

/// Rich comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn as_raw(self) -> c_int {
        match self {
            CompareOp::Lt => ffi::Py_LT,
            CompareOp::Le => ffi::Py_LE,
            CompareOp::Eq => ffi::Py_EQ,
            CompareOp::Ne => ffi::Py_NE,
            CompareOp::Gt => ffi::Py_GT,
            CompareOp::Ge => ffi::Py_GE,
        }
    }
}

/// Owned reference to a Python object.
///
/// # Thread Safety
///
/// `PyHandle` is `Send + Sync`: it only stores the address, and every
/// operation that dereferences it runs under the GIL.
pub struct PyHandle {
    ptr: NonNull<ffi::PyObject>,
    disposed: bool,
    immortal: bool,
}

unsafe impl Send for PyHandle {}
unsafe impl Sync for PyHandle {}

impl PyHandle {
    /// Take ownership of a new reference returned by the ABI.
    ///
    /// A null pointer means the call failed; the pending Python exception is
    /// fetched, cleared and returned as the error.
    ///
    /// # Safety
    ///
    /// The caller must hold the GIL and `ptr` must be null or a reference the
    /// caller owns.
    pub unsafe fn from_owned_ptr(ptr: *mut ffi::PyObject) -> Result<Self> {
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self::from_non_null(ptr)),
            None => Err(exception::fetch_error()),
        }
    }

    /// Create a handle from a borrowed reference, taking a new reference.
    ///
    /// # Safety
    ///
    /// The caller must hold the GIL and `ptr` must be null or point to a live
    /// object.
    pub unsafe fn from_borrowed_ptr(ptr: *mut ffi::PyObject) -> Result<Self> {
        let handle = Self::from_owned_ptr(ptr)?;
        if !handle.immortal {
            ffi::Py_IncRef(ptr);
        }
        Ok(handle)
    }

    pub(crate) unsafe fn from_non_null(ptr: NonNull<ffi::PyObject>) -> Self {
        Self {
            ptr,
            disposed: false,
            immortal: immortals().contains(ptr.as_ptr()),
        }
    }

    fn immortal(address: usize) -> Self {
        Self {
            ptr: Immortals::pointer(address),
            disposed: false,
            immortal: true,
        }
    }

    /// Handle to `None`
    pub fn none() -> Self {
        Self::immortal(immortals().none)
    }

    /// Handle to `True` or `False`
    pub fn bool(value: bool) -> Self {
        let immortals = immortals();
        Self::immortal(if value { immortals.true_ } else { immortals.false_ })
    }

    /// The raw object address. Valid only while the handle is not disposed.
    pub fn as_ptr(&self) -> *mut ffi::PyObject {
        self.ptr.as_ptr()
    }

    /// The raw object address, or [`Error::Disposed`].
    pub(crate) fn live_ptr(&self) -> Result<*mut ffi::PyObject> {
        if self.disposed {
            Err(Error::Disposed)
        } else {
            Ok(self.ptr.as_ptr())
        }
    }

    /// True once the handle has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// True for handles to immortal singletons
    pub fn is_immortal(&self) -> bool {
        self.immortal
    }

    /// Take an additional reference to the same object.
    ///
    /// The returned handle and `self` are disposed independently.
    pub fn clone_ref(&self) -> Result<Self> {
        let ptr = self.live_ptr()?;
        if !self.immortal {
            let _gil = Gil::acquire();
            unsafe { ffi::Py_IncRef(ptr) };
        }
        Ok(Self {
            ptr: self.ptr,
            disposed: false,
            immortal: self.immortal,
        })
    }

    /// Release the reference owned by this handle.
    ///
    /// Acquires the GIL if needed. Disposing twice is a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if self.immortal {
            return;
        }
        if !ffi::interpreter_alive() {
            tracing::debug!(
                address = ?self.ptr,
                "Python object released after the interpreter was finalized"
            );
            return;
        }
        let _gil = Gil::acquire();
        unsafe { ffi::Py_DecRef(self.ptr.as_ptr()) };
    }

    /// Identity comparison, like Python's `is`.
    pub fn is(&self, other: &PyHandle) -> bool {
        self.ptr == other.ptr
    }

    /// Python rich comparison (`self <op> other`).
    pub fn rich_compare(&self, other: &PyHandle, op: CompareOp) -> Result<bool> {
        let left = self.live_ptr()?;
        let right = other.live_ptr()?;
        let _gil = Gil::acquire();
        let outcome = unsafe { ffi::PyObject_RichCompareBool(left, right, op.as_raw()) };
        exception::check_status(outcome).map(|value| value == 1)
    }

    /// Python equality (`==`). Identical objects are equal without a call.
    pub fn equals(&self, other: &PyHandle) -> Result<bool> {
        if self.is(other) && !self.disposed {
            return Ok(true);
        }
        self.rich_compare(other, CompareOp::Eq)
    }

    /// Ordering derived from `<`, `==` and `>`; `None` when unordered.
    pub fn partial_compare(&self, other: &PyHandle) -> Result<Option<Ordering>> {
        if self.equals(other)? {
            return Ok(Some(Ordering::Equal));
        }
        if self.rich_compare(other, CompareOp::Lt)? {
            return Ok(Some(Ordering::Less));
        }
        if self.rich_compare(other, CompareOp::Gt)? {
            return Ok(Some(Ordering::Greater));
        }
        Ok(None)
    }

    /// `getattr(self, name)`
    pub fn get_attr(&self, name: &str) -> Result<PyHandle> {
        let ptr = self.live_ptr()?;
        let name = ffi::c_string(name)?;
        let _gil = Gil::acquire();
        unsafe { PyHandle::from_owned_ptr(ffi::PyObject_GetAttrString(ptr, name.as_ptr())) }
    }

    /// `hasattr(self, name)`
    pub fn has_attr(&self, name: &str) -> Result<bool> {
        let ptr = self.live_ptr()?;
        let name = ffi::c_string(name)?;
        let _gil = Gil::acquire();
        Ok(unsafe { ffi::PyObject_HasAttrString(ptr, name.as_ptr()) } == 1)
    }

    /// `setattr(self, name, value)`
    pub fn set_attr(&self, name: &str, value: &PyHandle) -> Result<()> {
        let ptr = self.live_ptr()?;
        let value = value.live_ptr()?;
        let name = ffi::c_string(name)?;
        let _gil = Gil::acquire();
        let status = unsafe { ffi::PyObject_SetAttrString(ptr, name.as_ptr(), value) };
        exception::check_status(status).map(drop)
    }

    /// `self[key]`
    pub fn get_item<K: ToPython + ?Sized>(&self, key: &K) -> Result<PyHandle> {
        let ptr = self.live_ptr()?;
        let _gil = Gil::acquire();
        let key = key.to_python()?;
        unsafe { PyHandle::from_owned_ptr(ffi::PyObject_GetItem(ptr, key.as_ptr())) }
    }

    /// `repr(self)`
    pub fn repr(&self) -> Result<String> {
        let ptr = self.live_ptr()?;
        let _gil = Gil::acquire();
        let text = unsafe { PyHandle::from_owned_ptr(ffi::PyObject_Repr(ptr))? };
        unsafe { utf8(text.as_ptr()) }
    }

    /// `str(self)`
    pub fn str(&self) -> Result<String> {
        let ptr = self.live_ptr()?;
        let _gil = Gil::acquire();
        let text = unsafe { PyHandle::from_owned_ptr(ffi::PyObject_Str(ptr))? };
        unsafe { utf8(text.as_ptr()) }
    }

    /// `type(self)`
    pub fn get_type(&self) -> Result<PyHandle> {
        let ptr = self.live_ptr()?;
        let _gil = Gil::acquire();
        unsafe { PyHandle::from_owned_ptr(ffi::PyObject_Type(ptr)) }
    }

    /// `type(self).__name__`
    pub fn type_name(&self) -> Result<String> {
        self.get_type()?.get_attr("__name__")?.str()
    }

    /// True if this is a handle to `None`. Does not need the GIL.
    pub fn is_none(&self) -> bool {
        self.ptr.as_ptr() as usize == immortals().none
    }

    /// `bool(self)`
    pub fn is_truthy(&self) -> Result<bool> {
        let ptr = self.live_ptr()?;
        if self.immortal {
            return Ok(ptr as usize == immortals().true_);
        }
        let _gil = Gil::acquire();
        let truth = unsafe { ffi::PyObject_IsTrue(ptr) };
        exception::check_status(truth).map(|value| value == 1)
    }

    /// `hash(self)`
    pub fn hash(&self) -> Result<isize> {
        let ptr = self.live_ptr()?;
        let _gil = Gil::acquire();
        let hash = unsafe { ffi::PyObject_Hash(ptr) };
        if hash == -1 {
            return Err(exception::fetch_error());
        }
        Ok(hash)
    }

    /// Current foreign refcount of the object. Diagnostic only.
    pub fn ref_count(&self) -> Result<isize> {
        let ptr = self.live_ptr()?;
        let _gil = Gil::acquire();
        Ok(unsafe { ffi::Py_REFCNT(ptr) })
    }
}

impl Drop for PyHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyHandle")
            .field("address", &self.ptr)
            .field("disposed", &self.disposed)
            .field("immortal", &self.immortal)
            .finish()
    }
}

/// Copy the UTF-8 contents of a Python `str`.
///
/// # Safety
///
/// The caller must hold the GIL and `ptr` must point to a live object.
pub(crate) unsafe fn utf8(ptr: *mut ffi::PyObject) -> Result<String> {
    let mut size: ffi::Py_ssize_t = 0;
    let data = ffi::PyUnicode_AsUTF8AndSize(ptr, &mut size);
    if data.is_null() {
        return Err(exception::fetch_error());
    }
    let bytes = std::slice::from_raw_parts(data as *const u8, size as usize);
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
