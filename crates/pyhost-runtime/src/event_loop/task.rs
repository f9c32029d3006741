//! Driver-side bookkeeping for one scheduled coroutine

use crate::cancel::Registration;
use crate::error::{Error, PythonError, Result};
use crate::object::PyHandle;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a scheduled coroutine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An asyncio task plus the promise of the host caller awaiting it.
///
/// Only the driver thread touches these, always with the GIL held.
pub(crate) struct CoroutineTask {
    id: TaskId,
    task: PyHandle,
    done: PyHandle,
    promise: Option<oneshot::Sender<Result<PyHandle>>>,
    registration: Option<Registration>,
}

impl CoroutineTask {
    pub(crate) fn new(
        id: TaskId,
        task: PyHandle,
        done: PyHandle,
        promise: oneshot::Sender<Result<PyHandle>>,
        registration: Registration,
    ) -> Self {
        Self {
            id,
            task,
            done,
            promise: Some(promise),
            registration: Some(registration),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Ask asyncio to cancel the task. The outcome is only known once the
    /// task reports done; a coroutine may swallow the cancellation.
    pub(crate) fn cancel(&mut self) {
        self.registration = None;
        if let Err(error) = self.task.call_method("cancel", &[]) {
            tracing::warn!(task = ?self.id, %error, "failed to cancel asyncio task");
        }
    }

    /// Resolve the caller's promise if the task is done.
    ///
    /// Returns true when the task concluded and can be dropped.
    pub(crate) fn conclude(&mut self) -> bool {
        match self.outcome() {
            Ok(None) => false,
            Ok(Some(outcome)) => {
                self.finish(outcome);
                true
            }
            Err(error) => {
                self.finish(Err(error));
                true
            }
        }
    }

    /// Fail the caller's promise without consulting the task.
    pub(crate) fn fail(&mut self, error: Error) {
        self.finish(Err(error));
    }

    // Order matters: `exception()` raises on a cancelled task and
    // `result()` re-raises the task's exception.
    fn outcome(&self) -> Result<Option<Result<PyHandle>>> {
        if !self.done.call(&[])?.is_truthy()? {
            return Ok(None);
        }
        if self.task.call_method("cancelled", &[])?.is_truthy()? {
            return Ok(Some(Err(Error::Canceled)));
        }
        let exception = self.task.call_method("exception", &[])?;
        if !exception.is_none() {
            return Ok(Some(Err(PythonError::from_exception(&exception).into())));
        }
        Ok(Some(self.task.call_method("result", &[])))
    }

    fn finish(&mut self, outcome: Result<PyHandle>) {
        self.registration = None;
        match &outcome {
            Ok(_) => tracing::trace!(task = ?self.id, "task completed"),
            Err(Error::Canceled) => tracing::trace!(task = ?self.id, "task canceled"),
            Err(error) => tracing::trace!(task = ?self.id, %error, "task faulted"),
        }
        if let Some(promise) = self.promise.take() {
            // The caller may have stopped waiting.
            let _ = promise.send(outcome);
        }
    }
}
