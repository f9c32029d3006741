//! pyhost runtime - embed CPython in a multi-threaded Rust host
//!
//! This crate is the layer generated bindings call into. It provides:
//!
//! - [`Gil`]: reentrant, per-thread acquisition of the interpreter lock
//! - [`PyHandle`]: owned, disposable references to Python objects
//! - translation of Python exceptions into [`PythonError`]
//! - calls with positional and keyword arguments ([`PyHandle::call`],
//!   [`PyHandle::call_with_keywords`])
//! - [`EventLoop`]: await Python coroutines from Rust futures, with
//!   cooperative cancellation through [`CancellationToken`]
//! - [`AsyncIterator`]: `async for` over Python async generators
//!
//! # Example
//!
//! ```ignore
//! use pyhost_runtime::{CancellationToken, Environment};
//!
//! let env = Environment::global()?;
//! let math = env.import("math")?;
//! let root: f64 = math.get_attr("sqrt")?.call(&[&2.0.to_python()?])?.extract()?;
//!
//! let sleep = env.import("asyncio")?.get_attr("sleep")?;
//! let coroutine = sleep.call(&[&0.to_python()?, &"done".to_python()?])?;
//! let text: String = env
//!     .run_coroutine(&coroutine, CancellationToken::none())
//!     .await?
//!     .extract()?;
//! ```

#![warn(missing_docs)]

pub mod cancel;
pub mod convert;
pub mod environment;
pub mod error;
pub mod event_loop;
pub mod exception;
pub mod ffi;
pub mod gil;
pub mod object;
pub mod options;

mod call;

pub use cancel::{CancellationSource, CancellationToken, Registration};
pub use convert::{FromPython, ToPython};
pub use environment::Environment;
pub use error::{Error, PythonError, Result};
pub use event_loop::{AsyncIterator, EventLoop};
pub use exception::check_and_translate;
pub use gil::{allow_threads, Gil, GilGuard};
pub use object::{CompareOp, PyHandle};
pub use options::EnvironmentOptions;
