//! Bounded-retry readiness polling.

use std::thread;
use std::time::Duration;

use crate::config::ReadyPolicy;

/// Call `check` up to `max_attempts` times, sleeping `interval` between
/// attempts. Returns true on the first success.
///
/// There is no sleep after the final attempt, so the worst case blocks for
/// `(max_attempts - 1) * interval` plus the time spent in `check`.
pub fn wait_until_ready<F>(mut check: F, max_attempts: u32, interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    for attempt in 0..max_attempts {
        if check() {
            return true;
        }
        if attempt + 1 < max_attempts {
            thread::sleep(interval);
        }
    }
    false
}

pub fn wait_with_policy<F>(check: F, policy: ReadyPolicy) -> bool
where
    F: FnMut() -> bool,
{
    wait_until_ready(check, policy.attempts, policy.interval())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn returns_on_first_success() {
        let mut calls = 0;
        let ready = wait_until_ready(
            || {
                calls += 1;
                true
            },
            5,
            Duration::from_secs(10),
        );
        assert!(ready);
        assert_eq!(calls, 1);
    }

    #[test]
    fn succeeds_after_some_attempts() {
        let mut calls = 0;
        let ready = wait_until_ready(
            || {
                calls += 1;
                calls == 3
            },
            5,
            Duration::from_millis(1),
        );
        assert!(ready);
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_budget() {
        let mut calls = 0;
        let started = Instant::now();
        let ready = wait_until_ready(
            || {
                calls += 1;
                false
            },
            4,
            Duration::from_millis(5),
        );
        assert!(!ready);
        assert_eq!(calls, 4);
        // three sleeps between four attempts
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn zero_attempts_never_calls_check() {
        let mut calls = 0;
        let ready = wait_with_policy(
            || {
                calls += 1;
                true
            },
            ReadyPolicy::new(0, 100),
        );
        assert!(!ready);
        assert_eq!(calls, 0);
    }
}
