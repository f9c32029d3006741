//! `pyhost await` - run a coroutine on the default event loop.
//!
//! Ctrl-C and `--timeout` cancel the coroutine cooperatively: the command
//! keeps waiting until Python confirms the cancellation (or the coroutine
//! finishes anyway).

use pyhost_runtime::{CancellationSource, Environment, PyHandle};
use std::time::Duration;

pub async fn execute(
    env: &Environment,
    module: &str,
    function: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let target = super::resolve(env, module, function)?;
    let coroutine = super::call_with_strings(&target, args)?;

    let source = CancellationSource::new();
    let pending = env.run_coroutine(&coroutine, source.token());
    tokio::pin!(pending);

    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut pending => return report(result),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling {module}.{function}...");
        }
        _ = deadline => {
            eprintln!("Timed out, cancelling {module}.{function}...");
        }
    }

    source.cancel();
    report(pending.await)
}

fn report(result: pyhost_runtime::Result<PyHandle>) -> anyhow::Result<()> {
    match result {
        Ok(value) => super::print_repr(&value),
        Err(e) if e.is_canceled() => anyhow::bail!("Coroutine was cancelled"),
        Err(e) => Err(e.into()),
    }
}
