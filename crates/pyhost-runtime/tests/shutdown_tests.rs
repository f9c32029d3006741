//! Runs in its own process: the environment here owns the interpreter.

use pyhost_runtime::{CancellationToken, Environment, EnvironmentOptions, Error};

#[tokio::test]
async fn test_shutdown_keeps_interpreter_for_live_loop() {
    let env = Environment::start(EnvironmentOptions::default()).unwrap();
    assert!(env.owns_interpreter());
    let event_loop = env.new_event_loop().unwrap();

    let err = env.shutdown().unwrap_err();
    assert!(matches!(err, Error::EventLoopsRunning(1)));

    // The interpreter was not finalized, so a new environment attaches and
    // the surviving loop still runs coroutines.
    let env = Environment::start(EnvironmentOptions::default()).unwrap();
    assert!(!env.owns_interpreter());
    let coroutine = env.eval("__import__('asyncio').sleep(0, 42)").unwrap();
    let value = event_loop
        .run_coroutine(&coroutine, CancellationToken::none())
        .await
        .unwrap();
    assert_eq!(value.extract::<i64>().unwrap(), 42);

    event_loop.dispose().unwrap();
    env.shutdown().unwrap();
}
