//! The embedded interpreter's lifetime
//!
//! An [`Environment`] initializes CPython (unless something else in the
//! process already did), resolves the asyncio entry points the event loop
//! bridge needs, and finalizes the interpreter again on
//! [`Environment::shutdown`].
//!
//! Initialization and finalization both happen on a dedicated
//! `pyhost-interpreter` thread. That thread owns the interpreter's main
//! thread state and parks with the GIL released for as long as the
//! environment lives, so no host thread is pinned to the interpreter.

use crate::cancel::CancellationToken;
use crate::convert::ToPython;
use crate::error::{Error, Result};
use crate::event_loop::{DriverCount, EventLoop};
use crate::exception;
use crate::ffi;
use crate::gil::{self, Gil};
use crate::object::{immortals, PyHandle};
use crate::options::EnvironmentOptions;
use crossbeam::channel::{self, Sender};
use once_cell::sync::OnceCell;
use std::future::Future;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const LIFECYCLE_THREAD_NAME: &str = "pyhost-interpreter";

/// Done-callback attached to every scheduled task
const STOP_ON_DONE: &str = "lambda fut: fut.get_loop().stop()";

/// Set while an environment is live in this process
static ACTIVE: AtomicBool = AtomicBool::new(false);

static GLOBAL: OnceCell<Environment> = OnceCell::new();

/// Python objects resolved once at start
pub(crate) struct Bindings {
    pub new_event_loop: PyHandle,
    pub ensure_future: PyHandle,
    pub stop_on_done: PyHandle,
}

/// The thread that initialized the interpreter and will finalize it
struct Lifecycle {
    /// Sends whether to finalize
    shutdown: Sender<bool>,
    handle: JoinHandle<()>,
}

impl Lifecycle {
    fn spawn(install_signal_handlers: bool) -> Result<Self> {
        let (ready_tx, ready_rx) = channel::bounded::<()>(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<bool>(1);

        let handle = thread::Builder::new()
            .name(LIFECYCLE_THREAD_NAME.to_string())
            .spawn(move || {
                unsafe { ffi::Py_InitializeEx(c_int::from(install_signal_handlers)) };
                let thread_state = unsafe { ffi::PyEval_SaveThread() };
                tracing::debug!("Python interpreter initialized");
                let _ = ready_tx.send(());

                // A vanished environment leaves the interpreter running.
                let Ok(true) = shutdown_rx.recv() else {
                    return;
                };
                unsafe { ffi::PyEval_RestoreThread(thread_state) };
                let status = unsafe { ffi::Py_FinalizeEx() };
                if status == 0 {
                    tracing::debug!("Python interpreter finalized");
                } else {
                    tracing::warn!(status, "errors while finalizing the Python interpreter");
                }
            })
            .map_err(|e| Error::ThreadSpawn {
                name: LIFECYCLE_THREAD_NAME.to_string(),
                message: e.to_string(),
            })?;

        ready_rx.recv().map_err(|_| Error::NotInitialized)?;
        Ok(Self {
            shutdown: shutdown_tx,
            handle,
        })
    }

    fn finish(self, finalize: bool) {
        let _ = self.shutdown.send(finalize);
        let _ = self.handle.join();
    }
}

/// A running embedded interpreter.
///
/// At most one environment is live per process; see
/// [`Environment::global`] for a shared, lazily started one.
pub struct Environment {
    options: EnvironmentOptions,
    lifecycle: Option<Lifecycle>,
    bindings: Option<Bindings>,
    default_loop: OnceCell<Arc<EventLoop>>,
    drivers: DriverCount,
    closed: bool,
}

impl Environment {
    /// Start the interpreter and resolve the runtime's Python bindings.
    ///
    /// If CPython is already initialized in this process the environment
    /// attaches to it and never finalizes it.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] if another environment is live.
    pub fn start(options: EnvironmentOptions) -> Result<Self> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        let lifecycle = if ffi::interpreter_alive() {
            tracing::debug!("attaching to an already initialized interpreter");
            None
        } else {
            match Lifecycle::spawn(options.install_signal_handlers) {
                Ok(lifecycle) => Some(lifecycle),
                Err(e) => {
                    ACTIVE.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }
        };

        // From here on, dropping `environment` undoes the start.
        let mut environment = Self {
            options,
            lifecycle,
            bindings: None,
            default_loop: OnceCell::new(),
            drivers: DriverCount::default(),
            closed: false,
        };
        environment.bindings = Some(environment.resolve_bindings()?);
        Ok(environment)
    }

    /// The process-wide environment, started with default options on first
    /// use and never shut down.
    pub fn global() -> Result<&'static Environment> {
        GLOBAL.get_or_try_init(|| Environment::start(EnvironmentOptions::default()))
    }

    fn resolve_bindings(&self) -> Result<Bindings> {
        let _gil = Gil::acquire();
        immortals();

        if !self.options.search_paths.is_empty() {
            let name = ffi::c_string("path")?;
            let sys_path =
                unsafe { PyHandle::from_borrowed_ptr(ffi::PySys_GetObject(name.as_ptr()))? };
            for path in &self.options.search_paths {
                let entry = path.to_string_lossy().to_python()?;
                sys_path.call_method("append", &[&entry])?;
            }
        }

        let asyncio = self.import("asyncio")?;
        Ok(Bindings {
            new_event_loop: asyncio.get_attr("new_event_loop")?,
            ensure_future: asyncio.get_attr("ensure_future")?,
            stop_on_done: self.eval(STOP_ON_DONE)?,
        })
    }

    pub(crate) fn bindings(&self) -> Result<&Bindings> {
        self.bindings.as_ref().ok_or(Error::NotInitialized)
    }

    pub(crate) fn drivers(&self) -> &DriverCount {
        &self.drivers
    }

    /// Options this environment was started with
    pub fn options(&self) -> &EnvironmentOptions {
        &self.options
    }

    /// True if this environment initialized the interpreter itself
    pub fn owns_interpreter(&self) -> bool {
        self.lifecycle.is_some()
    }

    /// `import module`
    pub fn import(&self, module: &str) -> Result<PyHandle> {
        let name = ffi::c_string(module)?;
        let _gil = Gil::acquire();
        unsafe { PyHandle::from_owned_ptr(ffi::PyImport_ImportModule(name.as_ptr())) }
    }

    /// A fresh globals dict with builtins available
    pub fn new_globals(&self) -> Result<PyHandle> {
        let _gil = Gil::acquire();
        let globals = unsafe { PyHandle::from_owned_ptr(ffi::PyDict_New())? };
        let builtins = self.import("builtins")?;
        let key = "__builtins__".to_python()?;
        exception::check_status(unsafe {
            ffi::PyDict_SetItem(globals.as_ptr(), key.as_ptr(), builtins.as_ptr())
        })?;
        Ok(globals)
    }

    /// Evaluate a single expression against `globals`
    pub fn evaluate(&self, expression: &str, globals: &PyHandle) -> Result<PyHandle> {
        self.run_string(expression, ffi::Py_eval_input, globals)
    }

    /// Execute statements against `globals`
    pub fn execute(&self, code: &str, globals: &PyHandle) -> Result<()> {
        self.run_string(code, ffi::Py_file_input, globals).map(drop)
    }

    /// Evaluate an expression in fresh globals
    pub fn eval(&self, expression: &str) -> Result<PyHandle> {
        let globals = self.new_globals()?;
        self.evaluate(expression, &globals)
    }

    fn run_string(&self, code: &str, start: c_int, globals: &PyHandle) -> Result<PyHandle> {
        let code = ffi::c_string(code)?;
        let globals = globals.live_ptr()?;
        let _gil = Gil::acquire();
        unsafe {
            PyHandle::from_owned_ptr(ffi::PyRun_StringFlags(
                code.as_ptr(),
                start,
                globals,
                globals,
                std::ptr::null_mut(),
            ))
        }
    }

    /// The default event loop, created on first use
    pub fn event_loop(&self) -> Result<Arc<EventLoop>> {
        self.default_loop
            .get_or_try_init(|| EventLoop::new(self).map(Arc::new))
            .cloned()
    }

    /// A new, independent event loop
    pub fn new_event_loop(&self) -> Result<EventLoop> {
        EventLoop::new(self)
    }

    /// Run `coroutine` on the default event loop
    pub fn run_coroutine(
        &self,
        coroutine: &PyHandle,
        cancellation: CancellationToken,
    ) -> impl Future<Output = Result<PyHandle>> + Send + 'static {
        let pending = self
            .event_loop()
            .map(|event_loop| event_loop.run_coroutine(coroutine, cancellation));
        async move { pending?.await }
    }

    /// Dispose the default loop, release cached objects and finalize the
    /// interpreter if this environment initialized it.
    ///
    /// Every loop from [`Environment::new_event_loop`] must be disposed
    /// first. While any driver thread is still running the interpreter is
    /// left initialized, and [`Error::EventLoopsRunning`] is returned unless
    /// disposing the default loop already failed.
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = Ok(());
        if let Some(event_loop) = self.default_loop.take() {
            result = event_loop.dispose();
        }
        self.bindings = None;

        if let Some(lifecycle) = self.lifecycle.take() {
            let mut finalize = self.options.finalize_on_shutdown;
            let live = self.drivers.live();
            if finalize && live > 0 {
                tracing::error!(
                    live,
                    "event loop drivers still running; not finalizing the interpreter"
                );
                finalize = false;
                if result.is_ok() {
                    result = Err(Error::EventLoopsRunning(live));
                }
            }
            gil::allow_threads(|| lifecycle.finish(finalize));
        }
        ACTIVE.store(false, Ordering::SeqCst);
        result
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::error!(%error, "failed to shut down Python environment");
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("options", &self.options)
            .field("owns_interpreter", &self.owns_interpreter())
            .field("closed", &self.closed)
            .finish()
    }
}
