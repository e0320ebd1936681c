//! Bounded retry with a fixed delay between attempts.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{BenchError, Result};

/// Attempt budget for waiting on a database or index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy { max_attempts, delay }
    }
}

impl Default for RetryPolicy {
    /// 30 attempts, 2 seconds apart.
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 30,
            delay: Duration::from_secs(2),
        }
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// The closure receives the 1-based attempt number. On exhaustion the last
/// error is wrapped in [`BenchError::Unreachable`] naming `target`.
pub fn retry<T, F>(target: &str, policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=attempts {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(target: "searchbench::retry", "{} attempt {} failed: {}", target, attempt, e);
                last = e.to_string();
            }
        }
        if attempt < attempts {
            info!("Waiting for {}... (attempt {}/{})", target, attempt, attempts);
            thread::sleep(policy.delay);
        }
    }

    Err(BenchError::Unreachable {
        target: target.to_string(),
        attempts,
        last,
    })
}
