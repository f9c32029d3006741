//! Bridge between host futures and an asyncio event loop
//!
//! Each [`EventLoop`] owns one asyncio loop and one driver thread that is
//! the only thread ever running it. Host threads never touch the loop
//! directly: [`EventLoop::run_coroutine`] puts a request on a lock-free FIFO
//! queue and wakes the driver, and the driver reports back through a
//! two-stage promise:
//!
//! 1. *acceptance*: the driver either started an asyncio task for the
//!    coroutine or rejected the request (already cancelled, loop stopping);
//! 2. *completion*: the task finished, was cancelled, or raised.
//!
//! Cancellation is cooperative. Cancelling the caller's token asks asyncio
//! to cancel the task; the caller sees [`Error::Canceled`] only once asyncio
//! confirms it. A coroutine that swallows the cancellation completes
//! normally.
//!
//! # Example
//!
//! ```ignore
//! let env = Environment::global()?;
//! let coroutine = env.eval("__import__('asyncio').sleep(0, 42)")?;
//! let value = env.event_loop()?
//!     .run_coroutine(&coroutine, CancellationToken::none())
//!     .await?;
//! ```

mod driver;
mod iter;
mod request;
mod task;

pub use iter::AsyncIterator;

use crate::cancel::CancellationToken;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::ffi;
use crate::gil::{self, Gil};
use crate::object::PyHandle;
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use crossbeam::queue::SegQueue;
use driver::{Driver, DriverBindings};
use parking_lot::Mutex;
use request::{Acceptance, Promise, Request, ScheduleRequest};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DRIVER_THREAD_NAME: &str = "pyhost-event-loop";

/// Bound methods used to wake the driver from other threads
struct Notifier {
    call_soon_threadsafe: PyHandle,
    stop: PyHandle,
}

/// State shared between the host side and the driver
pub(crate) struct Shared {
    requests: SegQueue<Request>,
    /// `None` once the queue is closed. Only locked with the GIL held.
    notifier: Mutex<Option<Notifier>>,
}

impl Shared {
    fn new(notifier: Notifier) -> Self {
        Self {
            requests: SegQueue::new(),
            notifier: Mutex::new(Some(notifier)),
        }
    }

    /// Queue a request and wake the driver.
    ///
    /// Hands the request back if the queue has been closed.
    pub(crate) fn enqueue(&self, request: Request) -> std::result::Result<(), Request> {
        let Ok(_gil) = Gil::try_acquire() else {
            return Err(request);
        };

        // Push and snapshot under the lock, call into Python after it: the
        // call may release the GIL.
        let (call_soon_threadsafe, stop) = {
            let notifier = self.notifier.lock();
            let Some(notifier) = notifier.as_ref() else {
                return Err(request);
            };
            let bound = notifier
                .call_soon_threadsafe
                .clone_ref()
                .and_then(|call| Ok((call, notifier.stop.clone_ref()?)));
            self.requests.push(request);
            match bound {
                Ok(bound) => bound,
                Err(error) => {
                    tracing::warn!(%error, "failed to wake event loop driver");
                    return Ok(());
                }
            }
        };

        if let Err(error) = call_soon_threadsafe.call(&[&stop]) {
            // Raised when the loop was closed after the push; the request
            // is rejected by whoever closed it.
            tracing::debug!(%error, "failed to wake event loop driver");
        }
        Ok(())
    }

    /// Close the queue and reject everything still in it. Caller holds the
    /// GIL.
    pub(crate) fn close(&self, error: Error) {
        let notifier = self.notifier.lock().take();
        drop(notifier);
        while let Some(request) = self.requests.pop() {
            request.reject(error.clone());
        }
    }
}

/// Number of driver threads an environment has started that are still
/// running
#[derive(Debug, Default)]
pub(crate) struct DriverCount(Arc<AtomicUsize>);

impl DriverCount {
    pub(crate) fn live(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn lease(&self) -> DriverLease {
        self.0.fetch_add(1, Ordering::SeqCst);
        DriverLease(self.0.clone())
    }
}

/// Held by a driver thread until it has released every Python reference
struct DriverLease(Arc<AtomicUsize>);

impl Drop for DriverLease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An asyncio event loop driven by a dedicated thread.
///
/// Dropping the loop disposes it; call [`EventLoop::dispose`] to observe
/// shutdown failures.
pub struct EventLoop {
    shared: Arc<Shared>,
    event_loop: PyHandle,
    driver: Mutex<Option<JoinHandle<()>>>,
    exited: Receiver<()>,
    shutdown_timeout: Duration,
    disposed: AtomicBool,
}

impl EventLoop {
    /// Create a new asyncio loop and start its driver thread.
    pub fn new(environment: &Environment) -> Result<Self> {
        let bindings = environment.bindings()?;
        let _gil = Gil::acquire();

        let event_loop = bindings.new_event_loop.call(&[])?;
        let notifier = Notifier {
            call_soon_threadsafe: event_loop.get_attr("call_soon_threadsafe")?,
            stop: event_loop.get_attr("stop")?,
        };
        let driver_bindings = DriverBindings {
            event_loop: event_loop.clone_ref()?,
            run_forever: event_loop.get_attr("run_forever")?,
            ensure_future: bindings.ensure_future.clone_ref()?,
            stop_on_done: bindings.stop_on_done.clone_ref()?,
        };

        let shared = Arc::new(Shared::new(notifier));
        let driver = Driver::new(shared.clone(), driver_bindings);
        let (exit_tx, exit_rx) = channel::bounded(1);
        let lease = environment.drivers().lease();

        let handle = thread::Builder::new()
            .name(DRIVER_THREAD_NAME.to_string())
            .spawn(move || {
                let _lease = lease;
                driver.run(exit_tx)
            })
            .map_err(|e| Error::ThreadSpawn {
                name: DRIVER_THREAD_NAME.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            shared,
            event_loop,
            driver: Mutex::new(Some(handle)),
            exited: exit_rx,
            shutdown_timeout: environment.options().shutdown_timeout(),
            disposed: AtomicBool::new(false),
        })
    }

    /// Override how long [`EventLoop::dispose`] waits for the driver.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Run `coroutine` on this loop and await its result.
    ///
    /// The request is queued immediately; the returned future only waits.
    /// Dropping the future before the task starts cancels the task.
    ///
    /// # Errors
    ///
    /// - [`Error::EventLoopDisposed`] after [`EventLoop::dispose`]
    /// - [`Error::NotAwaitable`] if the object has no `__await__`
    /// - [`Error::Canceled`] if the token fired before the task started, or
    ///   asyncio confirmed the cancellation
    /// - [`Error::Python`] if the coroutine raised
    pub fn run_coroutine(
        &self,
        coroutine: &PyHandle,
        cancellation: CancellationToken,
    ) -> impl Future<Output = Result<PyHandle>> + Send + 'static {
        let acceptance = self.submit(coroutine, cancellation);
        async move {
            let completion = acceptance?.await.map_err(|_| Error::EventLoopClosed)??;
            completion.await.map_err(|_| Error::EventLoopClosed)?
        }
    }

    fn submit(&self, coroutine: &PyHandle, cancellation: CancellationToken) -> Result<Acceptance> {
        if self.is_disposed() {
            return Err(Error::EventLoopDisposed);
        }
        if !coroutine.has_attr("__await__")? {
            let type_name = coroutine
                .type_name()
                .unwrap_or_else(|_| "<unknown>".to_string());
            return Err(Error::NotAwaitable(type_name));
        }

        let (promise, acceptance) = Promise::new();
        let request = Request::Schedule(ScheduleRequest {
            coroutine: coroutine.clone_ref()?,
            cancellation,
            promise,
        });
        self.shared
            .enqueue(request)
            .map_err(|_| Error::EventLoopClosed)?;
        Ok(acceptance)
    }

    /// True once [`EventLoop::dispose`] has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stop the driver, cancelling in-flight tasks, and close the loop.
    ///
    /// Waits up to the shutdown timeout with the caller's GIL suspended.
    /// Only the first call does anything.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !ffi::interpreter_alive() {
            tracing::debug!("event loop dropped after the interpreter was finalized");
            return Ok(());
        }

        tracing::debug!("disposing event loop");
        if self.shared.enqueue(Request::Stop).is_err() {
            tracing::debug!("event loop driver already exited");
        }

        let timeout = self.shutdown_timeout;
        let handle = self.driver.lock().take();
        let exited = gil::allow_threads(|| {
            let exited = self.exited.recv_timeout(timeout);
            if !matches!(exited, Err(RecvTimeoutError::Timeout)) {
                if let Some(handle) = handle {
                    join_driver(handle);
                }
            }
            exited
        });
        if let Err(RecvTimeoutError::Timeout) = exited {
            tracing::error!(?timeout, "event loop driver did not exit in time");
            return Err(Error::ShutdownTimeout(timeout));
        }

        let _gil = Gil::acquire();
        self.shared.close(Error::EventLoopClosed);
        self.event_loop.call_method("close", &[])?;
        Ok(())
    }
}

/// Join the driver thread, reporting a panic. Returns false if it panicked.
fn join_driver(handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<non-string panic>".to_string());
            tracing::error!(%message, "event loop driver panicked");
            false
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Err(error) = self.dispose() {
            tracing::error!(%error, "failed to dispose event loop");
        }
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("disposed", &self.is_disposed())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
