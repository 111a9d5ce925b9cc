//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code waits on I/O, channels or timers tied to an
//! event (`tokio::time::timeout`), never on a fixed sleep.
//! **Exceptions**: test code.

use architectural_enforcement::{assert_clean, scan, PRODUCTION_DIRS};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(PRODUCTION_DIRS, |line| {
        if line.code.contains("thread::sleep(") {
            Some("Thread sleep")
        } else if line.code.contains("time::sleep(") || line.code.contains("sleep_until(") {
            Some("Async sleep")
        } else {
            None
        }
    });

    assert_clean("No sleep, only wait on events", &violations);
}
