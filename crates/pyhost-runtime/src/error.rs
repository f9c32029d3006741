//! Error types for the embedded runtime

use std::time::Duration;

/// Result type used throughout the runtime
pub type Result<T> = std::result::Result<T, Error>;

/// An exception raised inside Python, translated for the host.
///
/// Only the exception's type name and its `str()` cross the boundary; the
/// traceback is dropped when the error is fetched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{type_name}: {message}")]
pub struct PythonError {
    type_name: String,
    message: String,
}

impl PythonError {
    /// Create a translated exception from its parts
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Name of the Python exception type (e.g. `ValueError`)
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// `str()` of the exception value
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Runtime errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An exception raised by Python code
    #[error(transparent)]
    Python(#[from] PythonError),

    /// The operation was cancelled before producing a result
    #[error("Operation was canceled")]
    Canceled,

    /// The object handle has already been disposed
    #[error("Python object handle has already been disposed")]
    Disposed,

    /// The event loop was disposed before the request was made
    #[error("Event loop has been disposed")]
    EventLoopDisposed,

    /// The event loop stopped before it could accept or finish the request
    #[error("Event loop is closed")]
    EventLoopClosed,

    /// The calling thread does not hold the GIL
    #[error("This operation requires the GIL to be held by the calling thread")]
    LockNotHeld,

    /// The interpreter is not running
    #[error("Python interpreter is not initialized")]
    NotInitialized,

    /// Another environment already owns the interpreter
    #[error("A Python environment is already running in this process")]
    AlreadyRunning,

    /// The object passed for scheduling cannot be awaited
    #[error("Object of type '{0}' is not awaitable")]
    NotAwaitable(String),

    /// The object passed for iteration has no `__aiter__`
    #[error("Object of type '{0}' is not an async iterable")]
    NotAsyncIterable(String),

    /// Invalid argument passed by the host
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A Python value could not be converted to the requested host type
    #[error("Conversion error: expected {expected}, got {actual}")]
    Conversion {
        /// Requested host-side type
        expected: String,
        /// Python type that was found
        actual: String,
    },

    /// The event loop driver did not exit in time
    #[error("Event loop driver did not exit within {0:?}")]
    ShutdownTimeout(Duration),

    /// Event loop drivers were still running at shutdown, so the
    /// interpreter was not finalized
    #[error("{0} event loop driver(s) still running; the interpreter was left initialized")]
    EventLoopsRunning(usize),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A runtime thread (interpreter lifecycle or event loop driver) could
    /// not be started
    #[error("Failed to spawn thread '{name}': {message}")]
    ThreadSpawn {
        /// Thread name
        name: String,
        /// OS error text
        message: String,
    },
}

impl Error {
    /// True for [`Error::Canceled`]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// The translated Python exception, if this error carries one
    pub fn as_python(&self) -> Option<&PythonError> {
        match self {
            Error::Python(e) => Some(e),
            _ => None,
        }
    }
}
