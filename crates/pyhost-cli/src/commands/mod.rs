//! Subcommand implementations

pub mod call;
pub mod coroutine;
pub mod eval;

use anyhow::Context;
use pyhost_runtime::{Environment, PyHandle, ToPython};

/// Import `module` and look up `function` in it.
fn resolve(env: &Environment, module: &str, function: &str) -> anyhow::Result<PyHandle> {
    let module_handle = env
        .import(module)
        .with_context(|| format!("Failed to import '{module}'"))?;
    module_handle
        .get_attr(function)
        .with_context(|| format!("'{module}' has no attribute '{function}'"))
}

/// Call `target` with every argument passed as a Python `str`.
fn call_with_strings(target: &PyHandle, args: &[String]) -> anyhow::Result<PyHandle> {
    let args = args
        .iter()
        .map(|arg| arg.to_python())
        .collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&PyHandle> = args.iter().collect();
    Ok(target.call(&refs)?)
}

fn print_repr(value: &PyHandle) -> anyhow::Result<()> {
    println!("{}", value.repr()?);
    Ok(())
}
