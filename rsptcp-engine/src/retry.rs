use log::debug;
use std::thread;
use std::time::Duration;

/// Fixed-attempt retry with a constant delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Stream teardown: 5 attempts, 100 ms apart.
    pub const UNINIT: Self = Self {
        max_attempts: 5,
        delay: Duration::from_millis(100),
    };

    /// Retune after an update race: one retry after 500 ms.
    pub const RETUNE: Self = Self {
        max_attempts: 2,
        delay: Duration::from_millis(500),
    };

    /// Run `op` until it succeeds, `retryable` rejects the error, or the attempts
    /// are used up. The last error is returned on exhaustion.
    pub fn run<T, E, F, R>(&self, what: &str, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    debug!(
                        "{what} attempt {attempt}/{} failed: {e}; retrying in {:?}",
                        self.max_attempts, self.delay
                    );
                    attempt += 1;
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::ZERO,
    };

    #[test]
    fn test_succeeds_first_time() {
        let mut calls = 0;
        let result: Result<u32, String> = FAST.run(
            "op",
            || {
                calls += 1;
                Ok(7)
            },
            |_| true,
        );
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_stops_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), String> = FAST.run(
            "op",
            || {
                calls += 1;
                Err(format!("fail {calls}"))
            },
            |_| true,
        );
        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_error_returns_immediately() {
        let mut calls = 0;
        let result: Result<(), &str> = FAST.run(
            "op",
            || {
                calls += 1;
                Err("fatal")
            },
            |e| *e != "fatal",
        );
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_recovers_on_later_attempt() {
        let mut calls = 0;
        let result: Result<u32, &str> = FAST.run(
            "op",
            || {
                calls += 1;
                if calls < 2 { Err("busy") } else { Ok(calls) }
            },
            |_| true,
        );
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn test_policies() {
        assert_eq!(RetryPolicy::UNINIT.max_attempts, 5);
        assert_eq!(RetryPolicy::RETUNE.max_attempts, 2);
        assert_eq!(RetryPolicy::RETUNE.delay, Duration::from_millis(500));
    }
}
