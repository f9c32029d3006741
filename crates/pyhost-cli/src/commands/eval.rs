//! `pyhost eval` - evaluate an inline expression.

use pyhost_runtime::Environment;

pub fn execute(env: &Environment, expression: &str) -> anyhow::Result<()> {
    let value = env.eval(expression)?;
    super::print_repr(&value)
}
