//! The driver thread
//!
//! The driver owns the asyncio loop. It alternates between running the loop
//! (`run_forever`) and draining the request queue: any request wakes the
//! loop through `call_soon_threadsafe(loop.stop)`, and every scheduled task
//! stops the loop when it finishes, so `run_forever` returns whenever there
//! is something for the driver to look at.
//!
//! ```text
//!   run_forever ──▶ drain requests ──▶ conclude finished tasks ──┐
//!        ▲                                                       │
//!        └──────────────── unless Stopping and idle ◀────────────┘
//! ```

use super::request::{Request, ScheduleRequest};
use super::task::{CoroutineTask, TaskId};
use super::Shared;
use crate::error::{Error, Result};
use crate::gil::Gil;
use crate::object::PyHandle;
use crossbeam::channel::Sender;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Running,
    Stopping,
}

/// Python objects the driver needs, resolved before the thread starts
pub(crate) struct DriverBindings {
    pub event_loop: PyHandle,
    pub run_forever: PyHandle,
    pub ensure_future: PyHandle,
    /// `lambda fut: fut.get_loop().stop()`
    pub stop_on_done: PyHandle,
}

pub(crate) struct Driver {
    shared: Arc<Shared>,
    bindings: DriverBindings,
    tasks: Vec<CoroutineTask>,
    state: DriverState,
}

impl Driver {
    pub(crate) fn new(shared: Arc<Shared>, bindings: DriverBindings) -> Self {
        Self {
            shared,
            bindings,
            tasks: Vec::new(),
            state: DriverState::Running,
        }
    }

    /// Thread body. Signals `exited` once every Python reference it held
    /// has been released.
    pub(crate) fn run(mut self, exited: Sender<()>) {
        tracing::debug!("event loop driver started");

        // Held for the driver's whole life; asyncio releases it while the
        // loop waits for I/O.
        let gil = match Gil::try_acquire() {
            Ok(gil) => gil,
            Err(error) => {
                tracing::error!(%error, "event loop driver could not attach to the interpreter");
                drop(self);
                let _ = exited.send(());
                return;
            }
        };

        loop {
            if let Err(error) = self.bindings.run_forever.call(&[]) {
                tracing::error!(%error, pending = self.tasks.len(), "event loop failed");
                for task in &mut self.tasks {
                    task.fail(error.clone());
                }
                self.tasks.clear();
                break;
            }

            self.drain_requests();
            self.tasks.retain_mut(|task| !task.conclude());

            if self.state == DriverState::Stopping && self.tasks.is_empty() {
                break;
            }
        }

        self.shared.close(Error::EventLoopClosed);
        drop(self);
        drop(gil);
        tracing::debug!("event loop driver exited");
        let _ = exited.send(());
    }

    fn drain_requests(&mut self) {
        while let Some(request) = self.shared.requests.pop() {
            tracing::debug!(?request, state = ?self.state, "handling event loop request");
            match request {
                Request::Schedule(request) => self.schedule(request),
                Request::Cancel(id) => {
                    if let Some(task) = self.tasks.iter_mut().find(|task| task.id() == id) {
                        task.cancel();
                    }
                }
                Request::Stop => {
                    if self.state == DriverState::Running {
                        self.state = DriverState::Stopping;
                        for task in &mut self.tasks {
                            task.cancel();
                        }
                    }
                }
            }
        }
    }

    fn schedule(&mut self, request: ScheduleRequest) {
        let ScheduleRequest {
            coroutine,
            cancellation,
            promise,
        } = request;

        // Rejected without touching the coroutine; the caller still owns it.
        if self.state == DriverState::Stopping || cancellation.is_cancellation_requested() {
            promise.reject(Error::Canceled);
            return;
        }

        let id = TaskId::next();
        let (asyncio_task, done) = match self.start(&coroutine) {
            Ok(started) => started,
            Err(error) => {
                promise.reject(error);
                return;
            }
        };

        let queue = Arc::downgrade(&self.shared);
        let registration = cancellation.register(move || request_cancel(&queue, id));

        let (completion_tx, completion_rx) = oneshot::channel();
        let mut task = CoroutineTask::new(id, asyncio_task, done, completion_tx, registration);

        if !promise.accept(completion_rx) {
            tracing::debug!(task = ?id, "caller went away before the task started; cancelling");
            task.cancel();
        }
        self.tasks.push(task);
    }

    /// Wrap the coroutine in an asyncio task that stops the loop when done.
    ///
    /// Returns the task and its bound `done` method.
    fn start(&self, coroutine: &PyHandle) -> Result<(PyHandle, PyHandle)> {
        let task = self.bindings.ensure_future.call_with_keywords(
            &[coroutine],
            &["loop"],
            &[&self.bindings.event_loop],
            None,
        )?;
        let setup = task
            .call_method("add_done_callback", &[&self.bindings.stop_on_done])
            .and_then(|_| task.get_attr("done"));
        match setup {
            Ok(done) => Ok((task, done)),
            Err(error) => {
                if let Err(cancel_error) = task.call_method("cancel", &[]) {
                    tracing::warn!(
                        error = %cancel_error,
                        "failed to cancel partially started task"
                    );
                }
                Err(error)
            }
        }
    }
}

fn request_cancel(queue: &Weak<Shared>, id: TaskId) {
    if let Some(shared) = queue.upgrade() {
        // A closed queue means the task is being torn down anyway.
        let _ = shared.enqueue(Request::Cancel(id));
    }
}
