//! Cooperative cancellation
//!
//! A [`CancellationSource`] hands out [`CancellationToken`]s. Consumers
//! either poll a token or register a callback, which runs exactly once on
//! the thread that calls [`CancellationSource::cancel`] (or immediately, if
//! the token was already cancelled when the callback was registered).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Callback = Box<dyn FnOnce() + Send>;

struct State {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

impl State {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        }
    }
}

/// Owner side of a cancellation signal
pub struct CancellationSource {
    state: Arc<State>,
}

impl CancellationSource {
    /// Create a source that has not been cancelled
    pub fn new() -> Self {
        Self {
            state: Arc::new(State::new()),
        }
    }

    /// A token observing this source
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            state: Some(self.state.clone()),
        }
    }

    /// Request cancellation and run every registered callback.
    ///
    /// Only the first call has an effect.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Run outside the lock: callbacks may register or drop registrations.
        let callbacks = std::mem::take(&mut *self.state.callbacks.lock());
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// True once [`CancellationSource::cancel`] has been called
    pub fn is_cancellation_requested(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancellation_requested())
            .finish()
    }
}

/// Observer side of a cancellation signal.
///
/// The default token is never cancelled.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Option<Arc<State>>,
}

impl CancellationToken {
    /// A token that can never be cancelled
    pub fn none() -> Self {
        Self::default()
    }

    /// False for [`CancellationToken::none`]
    pub fn can_be_canceled(&self) -> bool {
        self.state.is_some()
    }

    /// True once the owning source has been cancelled
    pub fn is_cancellation_requested(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.cancelled.load(Ordering::SeqCst))
    }

    /// Run `callback` when cancellation is requested.
    ///
    /// If cancellation was already requested the callback runs on the
    /// calling thread before this returns. Dropping the returned
    /// [`Registration`] unregisters a callback that has not run yet.
    pub fn register(&self, callback: impl FnOnce() + Send + 'static) -> Registration {
        let Some(state) = &self.state else {
            return Registration::empty();
        };

        let id = state.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut callbacks = state.callbacks.lock();
            // Checked under the lock so a concurrent cancel either sees the
            // callback or we see the flag.
            if !state.cancelled.load(Ordering::SeqCst) {
                callbacks.push((id, Box::new(callback)));
                return Registration {
                    state: Arc::downgrade(state),
                    id,
                };
            }
        }
        callback();
        Registration::empty()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("can_be_canceled", &self.can_be_canceled())
            .field("cancelled", &self.is_cancellation_requested())
            .finish()
    }
}

/// A registered cancellation callback. Dropping it unregisters the callback.
#[must_use = "dropping the registration unregisters the callback"]
pub struct Registration {
    state: Weak<State>,
    id: u64,
}

impl Registration {
    fn empty() -> Self {
        Self {
            state: Weak::new(),
            id: 0,
        }
    }

    /// Unregister now. Equivalent to dropping the registration.
    pub fn unregister(self) {}
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.callbacks.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_none_token_is_never_cancelled() {
        let token = CancellationToken::none();
        assert!(!token.can_be_canceled());
        assert!(!token.is_cancellation_requested());
        let _registration = token.register(|| panic!("must not run"));
    }

    #[test]
    fn test_cancel_runs_callbacks_once() {
        let source = CancellationSource::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _registration = source.token().register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        source.cancel();
        source.cancel();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(source.token().is_cancellation_requested());
    }

    #[test]
    fn test_register_after_cancel_runs_immediately() {
        let source = CancellationSource::new();
        source.cancel();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _registration = source.token().register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_registration_does_not_fire() {
        let source = CancellationSource::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let registration = source.token().register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(registration);

        source.cancel();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let source = Arc::new(CancellationSource::new());
        let token = source.token();
        let remote = source.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.is_cancellation_requested());
    }
}
