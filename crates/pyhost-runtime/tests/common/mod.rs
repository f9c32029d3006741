//! Shared helpers for integration tests

#![allow(dead_code)]

use pyhost_runtime::{Environment, PyHandle, ToPython};

/// The process-wide environment shared by every test in the binary
pub fn env() -> &'static Environment {
    Environment::global().expect("failed to start the Python environment")
}

/// Execute `code` in fresh globals and return the globals dict.
///
/// Each call gets its own namespace, so module-level state such as logs is
/// not shared between tests.
pub fn module(code: &str) -> PyHandle {
    let env = env();
    let globals = env.new_globals().unwrap();
    env.execute(code, &globals).unwrap();
    globals
}

/// Look up a name in a globals dict
pub fn lookup(globals: &PyHandle, name: &str) -> PyHandle {
    globals.get_item(name).unwrap()
}

/// Evaluate an expression in fresh globals
pub fn eval(expression: &str) -> PyHandle {
    env().eval(expression).unwrap()
}

/// Convert a host value, panicking on failure
pub fn py<T: ToPython + ?Sized>(value: &T) -> PyHandle {
    value.to_python().unwrap()
}
