//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Poll `condition` every millisecond until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Assert the sequence is exactly `0..count`
pub fn assert_sequence(received: &[u64], count: u64) {
    let expected: Vec<u64> = (0..count).collect();
    assert_eq!(
        received,
        expected.as_slice(),
        "Expected the {} units in order, got {} units",
        count,
        received.len()
    );
}
