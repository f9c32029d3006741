//! Global interpreter lock coordination
//!
//! CPython lets exactly one thread run interpreter code at a time. Host
//! threads call [`Gil::acquire`] before touching any Python object and keep
//! the returned [`GilGuard`] alive while they do. Acquisition is reentrant
//! per thread: nested guards only bump a thread-local counter, and the GIL is
//! handed back once the outermost guard is released.
//!
//! Components that work with native references do not verify the lock at
//! every call site. They either acquire it themselves (cheap when already
//! held) or document that the caller must hold it.

use crate::error::{Error, Result};
use crate::ffi;
use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    /// Number of live guards on this thread
    static DEPTH: Cell<usize> = const { Cell::new(0) };

    /// State returned by `PyGILState_Ensure` for the outermost guard
    static STATE: Cell<Option<ffi::PyGILState_STATE>> = const { Cell::new(None) };
}

/// Entry point for acquiring and inspecting the GIL.
pub struct Gil;

impl Gil {
    /// Block until the calling thread owns the GIL.
    ///
    /// Returns immediately when the thread already owns it.
    ///
    /// # Panics
    ///
    /// Panics when the interpreter has not been initialized. Touching
    /// CPython in that state is a fatal programming error; use
    /// [`Gil::try_acquire`] to observe it as an error instead.
    pub fn acquire() -> GilGuard {
        match Self::try_acquire() {
            Ok(guard) => guard,
            Err(e) => panic!("cannot acquire the GIL: {e}"),
        }
    }

    /// Like [`Gil::acquire`], but reports an uninitialized interpreter as
    /// [`Error::NotInitialized`].
    pub fn try_acquire() -> Result<GilGuard> {
        let depth = DEPTH.with(Cell::get);
        if depth == 0 {
            if !ffi::interpreter_alive() {
                return Err(Error::NotInitialized);
            }
            let state = unsafe { ffi::PyGILState_Ensure() };
            STATE.with(|s| s.set(Some(state)));
        }
        DEPTH.with(|d| d.set(depth + 1));
        Ok(GilGuard {
            released: false,
            _not_send: PhantomData,
        })
    }

    /// True iff the calling thread currently owns the GIL.
    pub fn is_acquired() -> bool {
        DEPTH.with(Cell::get) > 0
    }

    /// Fail with [`Error::LockNotHeld`] unless the calling thread owns the GIL.
    pub fn require() -> Result<()> {
        if Self::is_acquired() {
            Ok(())
        } else {
            Err(Error::LockNotHeld)
        }
    }

    /// Nesting depth of the calling thread's guards.
    pub fn depth() -> usize {
        DEPTH.with(Cell::get)
    }
}

/// Proof that the current thread holds the GIL.
///
/// Dropping the guard (or calling [`GilGuard::release`]) gives up one level
/// of ownership. The guard is tied to the thread that created it and is
/// therefore neither `Send` nor `Sync`.
#[must_use = "the GIL is released as soon as the guard is dropped"]
pub struct GilGuard {
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl GilGuard {
    /// Release this guard's level of ownership. A second call is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        release_one();
    }
}

impl Drop for GilGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for GilGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GilGuard")
            .field("released", &self.released)
            .field("depth", &Gil::depth())
            .finish()
    }
}

fn release_one() {
    let depth = DEPTH.with(Cell::get);
    if depth == 0 {
        tracing::warn!("GIL released more times than it was acquired on this thread");
        return;
    }
    DEPTH.with(|d| d.set(depth - 1));
    if depth > 1 {
        return;
    }
    if let Some(state) = STATE.with(Cell::take) {
        // After finalization there is no thread state left to hand back.
        if ffi::interpreter_alive() {
            unsafe { ffi::PyGILState_Release(state) };
        }
    }
}

/// Run `f` with the calling thread's GIL ownership suspended.
///
/// All nesting levels are given up for the duration of `f` and restored
/// afterwards, even if `f` panics. Use this around blocking waits on other
/// threads that may themselves need the GIL. When the thread does not hold
/// the GIL, `f` simply runs.
pub fn allow_threads<T>(f: impl FnOnce() -> T) -> T {
    let depth = DEPTH.with(|d| d.replace(0));
    if depth == 0 {
        return f();
    }
    let state = STATE.with(Cell::take);
    let thread_state = unsafe { ffi::PyEval_SaveThread() };
    let _restore = Suspended {
        depth,
        state,
        thread_state,
    };
    f()
}

/// Restores a suspended GIL ownership on drop
struct Suspended {
    depth: usize,
    state: Option<ffi::PyGILState_STATE>,
    thread_state: *mut ffi::PyThreadState,
}

impl Drop for Suspended {
    fn drop(&mut self) {
        unsafe { ffi::PyEval_RestoreThread(self.thread_state) };
        let state = self.state.take();
        STATE.with(|s| s.set(state));
        DEPTH.with(|d| d.set(self.depth));
    }
}
