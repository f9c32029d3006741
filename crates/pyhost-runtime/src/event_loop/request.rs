//! Requests handed from host threads to the driver

use super::task::TaskId;
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::object::PyHandle;
use tokio::sync::oneshot;

/// Receiver for a task's final outcome (stage 2)
pub(crate) type Completion = oneshot::Receiver<Result<PyHandle>>;

/// Receiver for acceptance or rejection of a schedule request (stage 1)
pub(crate) type Acceptance = oneshot::Receiver<Result<Completion>>;

/// A unit of work for the driver. Processed strictly in FIFO order.
pub(crate) enum Request {
    /// Start a coroutine as an asyncio task
    Schedule(ScheduleRequest),
    /// Cancel a task that was started earlier
    Cancel(TaskId),
    /// Cancel everything and let the driver exit
    Stop,
}

impl Request {
    /// Fail the caller waiting on this request, if there is one.
    pub(crate) fn reject(self, error: Error) {
        if let Request::Schedule(request) = self {
            request.promise.reject(error);
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Schedule(_) => f.write_str("Schedule"),
            Request::Cancel(id) => write!(f, "Cancel({id:?})"),
            Request::Stop => f.write_str("Stop"),
        }
    }
}

pub(crate) struct ScheduleRequest {
    /// New reference to the coroutine, owned by the request
    pub coroutine: PyHandle,
    pub cancellation: CancellationToken,
    pub promise: Promise,
}

/// Sending half of the two-stage promise
pub(crate) struct Promise {
    sender: oneshot::Sender<Result<Completion>>,
}

impl Promise {
    pub(crate) fn new() -> (Self, Acceptance) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Resolve stage 1 with the receiver for stage 2.
    ///
    /// Returns false when the caller has already dropped its future.
    pub(crate) fn accept(self, completion: Completion) -> bool {
        self.sender.send(Ok(completion)).is_ok()
    }

    pub(crate) fn reject(self, error: Error) {
        let _ = self.sender.send(Err(error));
    }
}
