use crate::api::error::{Error, RestError};
use std::{fmt, thread, time::Duration};

/// Delay between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after every failed attempt, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `attempt`-th failure, counting from 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(interval) => interval,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.checked_mul(factor).map_or(max, |delay| delay.min(max))
            }
        }
    }
}

/// How often and how patiently remote calls are repeated.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable: fn(&RestError) -> bool,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 30,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
            retryable: RestError::is_transient,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        RetryPolicy {
            max_attempts,
            backoff,
            ..RetryPolicy::default()
        }
    }

    /// A single attempt, no retries.
    pub fn never() -> Self {
        RetryPolicy::new(1, Backoff::Fixed(Duration::from_secs(0)))
    }

    pub fn with_retryable(mut self, retryable: fn(&RestError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Call `operation` until it succeeds, fails with a non retryable error or
    /// `max_attempts` calls were made. `context` describes the operation, e.g.
    /// `getting experiment mnist in namespace default`.
    pub fn call<T, F>(&self, context: &str, mut operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Result<T, RestError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let source = match operation() {
                Ok(value) => return Ok(value),
                Err(source) => source,
            };
            if !(self.retryable)(&source) {
                return Err(Error::Remote {
                    context: context.to_owned(),
                    attempts,
                    source,
                });
            }
            if attempts >= max_attempts {
                tracing::error!("Maximum retries reached when {}: {}", context, source);
                return Err(Error::Remote {
                    context: context.to_owned(),
                    attempts,
                    source,
                });
            }
            tracing::debug!("Retrying {}/{}: {}", attempts, max_attempts, source);
            thread::sleep(self.backoff.delay(attempts));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> RestError {
        RestError::Status {
            status: 503,
            reason: "ServiceUnavailable".into(),
            message: "etcd leader changed".into(),
        }
    }

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::from_millis(0)))
    }

    #[test]
    fn exhaust_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), Error> = quick(4).call("listing experiments", || {
            calls += 1;
            Err(unavailable())
        });
        assert_eq!(calls, 4);
        match result {
            Err(Error::Remote { attempts, source, context }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source, unavailable());
                assert_eq!(context, "listing experiments");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn recover_from_transient_failures() {
        let mut calls = 0;
        let value = quick(5)
            .call("getting job", || {
                calls += 1;
                if calls < 3 {
                    Err(RestError::Transport("connection reset".into()))
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), Error> = quick(5).call("getting experiment", || {
            calls += 1;
            Err(RestError::Status {
                status: 404,
                reason: "NotFound".into(),
                message: String::new(),
            })
        });
        assert_eq!(calls, 1);
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn custom_classification() {
        let mut calls = 0;
        let _ = quick(3)
            .with_retryable(|_| true)
            .call::<(), _>("creating result", || {
                calls += 1;
                Err(RestError::Decode("truncated".into()))
            });
        assert_eq!(calls, 3);
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let mut calls = 0;
        let _ = quick(0).call::<(), _>("deleting run", || {
            calls += 1;
            Err(unavailable())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(10), Duration::from_secs(1));
        assert_eq!(backoff.delay(64), Duration::from_secs(1));
    }
}
