mod common;

use pyhost_runtime::{allow_threads, Error, Gil};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

// ============================================================================
// Ownership Tests
// ============================================================================

#[test]
fn test_fresh_thread_does_not_hold_lock() {
    common::env();
    let held = thread::spawn(Gil::is_acquired).join().unwrap();
    assert!(!held);
}

#[test]
fn test_nested_acquire_release() {
    common::env();
    thread::spawn(|| {
        let outer = Gil::acquire();
        assert!(Gil::is_acquired());
        {
            let _inner = Gil::acquire();
            assert_eq!(Gil::depth(), 2);
        }
        assert!(Gil::is_acquired());
        assert_eq!(Gil::depth(), 1);
        drop(outer);
        assert!(!Gil::is_acquired());
    })
    .join()
    .unwrap();
}

#[test]
fn test_repeated_release_is_harmless() {
    common::env();
    thread::spawn(|| {
        let mut guard = Gil::acquire();
        guard.release();
        guard.release();
        drop(guard);
        assert!(!Gil::is_acquired());

        // The lock is still usable afterwards.
        let _guard = Gil::acquire();
        assert!(Gil::is_acquired());
    })
    .join()
    .unwrap();
}

#[test]
fn test_require() {
    common::env();
    thread::spawn(|| {
        assert!(matches!(Gil::require(), Err(Error::LockNotHeld)));
        let _guard = Gil::try_acquire().unwrap();
        assert!(Gil::require().is_ok());
    })
    .join()
    .unwrap();
}

// ============================================================================
// Cross-Thread Tests
// ============================================================================

#[test]
fn test_ownership_does_not_leak_across_threads() {
    common::env();
    thread::spawn(|| {
        let _guard = Gil::acquire();
        let sampled = thread::spawn(Gil::is_acquired).join().unwrap();
        assert!(!sampled);
        assert!(Gil::is_acquired());
    })
    .join()
    .unwrap();
}

#[test]
fn test_allow_threads_lets_other_threads_run_python() {
    let env = common::env();
    thread::spawn(move || {
        let _outer = Gil::acquire();
        let _inner = Gil::acquire();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        allow_threads(|| {
            assert!(!Gil::is_acquired());
            thread::spawn(move || {
                let value: i64 = env.eval("6 * 7").unwrap().extract().unwrap();
                assert_eq!(value, 42);
                flag.store(true, Ordering::SeqCst);
            })
            .join()
            .unwrap();
        });

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(Gil::depth(), 2);
    })
    .join()
    .unwrap();
}

#[test]
fn test_many_threads_take_turns() {
    let env = common::env();
    let handles: Vec<_> = (0..8i64)
        .map(|i| {
            thread::spawn(move || {
                for _ in 0..25 {
                    let value: i64 = env
                        .eval(&format!("{i} + 1"))
                        .unwrap()
                        .extract()
                        .unwrap();
                    assert_eq!(value, i + 1);
                }
                assert!(!Gil::is_acquired());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
