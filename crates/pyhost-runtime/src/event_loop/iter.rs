//! `async for` over Python async iterators

use super::EventLoop;
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::object::PyHandle;

const STOP_ASYNC_ITERATION: &str = "StopAsyncIteration";

/// A Python async iterator whose items are awaited on an [`EventLoop`].
///
/// Each [`AsyncIterator::next`] schedules `__anext__()` on the loop like
/// any other coroutine. `StopAsyncIteration` ends the iteration.
///
/// ```ignore
/// let mut items = event_loop.iterate(&generator, CancellationToken::none())?;
/// while let Some(item) = items.next().await? {
///     println!("{}", item.repr()?);
/// }
/// ```
pub struct AsyncIterator<'a> {
    event_loop: &'a EventLoop,
    iterator: PyHandle,
    cancellation: CancellationToken,
    exhausted: bool,
}

impl EventLoop {
    /// Start iterating `iterable` (anything with `__aiter__`).
    ///
    /// `cancellation` applies to every step.
    ///
    /// # Errors
    ///
    /// [`Error::NotAsyncIterable`] if the object has no `__aiter__`.
    pub fn iterate(
        &self,
        iterable: &PyHandle,
        cancellation: CancellationToken,
    ) -> Result<AsyncIterator<'_>> {
        if !iterable.has_attr("__aiter__")? {
            let type_name = iterable
                .type_name()
                .unwrap_or_else(|_| "<unknown>".to_string());
            return Err(Error::NotAsyncIterable(type_name));
        }
        Ok(AsyncIterator {
            event_loop: self,
            iterator: iterable.call_method("__aiter__", &[])?,
            cancellation,
            exhausted: false,
        })
    }
}

impl AsyncIterator<'_> {
    /// Await the next item; `None` once the iterator is exhausted.
    pub async fn next(&mut self) -> Result<Option<PyHandle>> {
        if self.exhausted {
            return Ok(None);
        }
        let pending = {
            let step = self.iterator.call_method("__anext__", &[])?;
            self.event_loop.run_coroutine(&step, self.cancellation.clone())
        };
        match pending.await {
            Ok(item) => Ok(Some(item)),
            Err(Error::Python(e)) if e.type_name() == STOP_ASYNC_ITERATION => {
                self.exhausted = true;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Await every remaining item.
    pub async fn collect(mut self) -> Result<Vec<PyHandle>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

impl std::fmt::Debug for AsyncIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncIterator")
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
