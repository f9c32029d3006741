//! `pyhost call` - call a module-level function.

use pyhost_runtime::Environment;

pub fn execute(
    env: &Environment,
    module: &str,
    function: &str,
    args: &[String],
) -> anyhow::Result<()> {
    let target = super::resolve(env, module, function)?;
    let value = super::call_with_strings(&target, args)?;
    super::print_repr(&value)
}
