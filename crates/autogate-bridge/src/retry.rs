//! Bounded retries for flaky device I/O.
//!
//! I2C peripherals occasionally NACK or return garbage. A [`RetryPolicy`]
//! repeats an operation while its error is classified as transient (see
//! [`TransientFault`]), sleeping between attempts. Once the budget is spent,
//! or on any error outside the transient set, the last error is surfaced as
//! [`Error::FatalDeviceFault`] carrying the number of attempts made.

use std::error::Error as StdError;
use std::thread;
use std::time::Duration;

use autogate_core::{Error, Result, TransientFault};
use tracing::{debug, warn};

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed(Duration),

    /// `initial` before the first retry, growing by `step` each time.
    Incremental { initial: Duration, step: Duration },
}

impl Backoff {
    /// Delay after the `failures`-th failed attempt (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Incremental { initial, step } => {
                initial.saturating_add(step.saturating_mul(failures.saturating_sub(1)))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: String,
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Policy with a fixed delay between attempts. `max_attempts` counts the
    /// first try and is at least 1.
    pub fn fixed(name: impl Into<String>, max_attempts: u32, delay: Duration) -> Self {
        Self {
            name: name.into(),
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn incremental(
        name: impl Into<String>,
        max_attempts: u32,
        initial: Duration,
        step: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Incremental { initial, step },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// # Errors
    ///
    /// [`Error::FatalDeviceFault`] wrapping the last error.
    pub fn retry<T, E, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, E>,
        E: TransientFault + StdError + Send + Sync + 'static,
    {
        self.run(&mut (), |_| op(), |_| Ok(()))
    }

    /// Run `read` against `handle`, reinitializing the handle before every
    /// retry. A failed reinit counts as a failed attempt.
    ///
    /// # Errors
    ///
    /// [`Error::FatalDeviceFault`] wrapping the last error.
    pub fn retry_with_reinit<H, T, E, R, I>(&self, handle: &mut H, read: R, reinit: I) -> Result<T>
    where
        R: FnMut(&mut H) -> std::result::Result<T, E>,
        I: FnMut(&mut H) -> std::result::Result<(), E>,
        E: TransientFault + StdError + Send + Sync + 'static,
    {
        self.run(handle, read, reinit)
    }

    fn run<H, T, E, R, I>(&self, handle: &mut H, mut read: R, mut reinit: I) -> Result<T>
    where
        H: ?Sized,
        R: FnMut(&mut H) -> std::result::Result<T, E>,
        I: FnMut(&mut H) -> std::result::Result<(), E>,
        E: TransientFault + StdError + Send + Sync + 'static,
    {
        let mut attempt = 1;
        let mut outcome = read(handle);
        loop {
            let error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = %self.name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= self.max_attempts {
                return Err(Error::fatal(attempt, error));
            }

            let delay = self.backoff.delay(attempt);
            warn!(
                operation = %self.name,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Transient fault: {}", error
            );
            thread::sleep(delay);
            attempt += 1;

            outcome = reinit(handle).and_then(|()| read(handle));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, thiserror::Error)]
    enum FakeError {
        #[error("no ACK")]
        Nack,
        #[error("wrong chip")]
        WrongChip,
    }

    impl TransientFault for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Nack)
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed("test", attempts, Duration::ZERO)
    }

    #[test]
    fn test_succeeds_on_third_attempt() {
        let mut calls = 0;
        let value = policy(3)
            .retry(|| {
                calls += 1;
                if calls < 3 { Err(FakeError::Nack) } else { Ok(42) }
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_budget_exhausted_is_fatal() {
        let mut calls = 0;
        let err = policy(3)
            .retry(|| -> std::result::Result<(), _> {
                calls += 1;
                Err(FakeError::Nack)
            })
            .unwrap_err();

        assert_eq!(calls, 3);
        assert!(matches!(err, Error::FatalDeviceFault { attempts: 3, .. }));
    }

    #[test]
    fn test_non_transient_fails_immediately() {
        let mut calls = 0;
        let err = policy(5)
            .retry(|| -> std::result::Result<(), _> {
                calls += 1;
                Err(FakeError::WrongChip)
            })
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, Error::FatalDeviceFault { attempts: 1, .. }));
        assert!(err.to_string().contains("wrong chip"));
    }

    #[test]
    fn test_reinit_runs_before_each_retry() {
        let mut log = Vec::new();
        let mut reads = 0;
        let value = policy(3)
            .retry_with_reinit(
                &mut log,
                |log| {
                    log.push("read");
                    reads += 1;
                    if reads < 3 { Err(FakeError::Nack) } else { Ok(reads) }
                },
                |log| {
                    log.push("reinit");
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(log, vec!["read", "reinit", "read", "reinit", "read"]);
    }

    #[test]
    fn test_failed_reinit_consumes_attempt() {
        let mut reads = 0;
        let err = policy(2)
            .retry_with_reinit(
                &mut reads,
                |reads| -> std::result::Result<(), _> {
                    *reads += 1;
                    Err(FakeError::Nack)
                },
                |_| Err(FakeError::Nack),
            )
            .unwrap_err();

        assert_eq!(reads, 1);
        assert!(matches!(err, Error::FatalDeviceFault { attempts: 2, .. }));
    }

    #[rstest]
    #[case(Backoff::Fixed(Duration::from_millis(100)), 1, 100)]
    #[case(Backoff::Fixed(Duration::from_millis(100)), 4, 100)]
    #[case(Backoff::Incremental { initial: Duration::from_millis(100), step: Duration::from_millis(50) }, 1, 100)]
    #[case(Backoff::Incremental { initial: Duration::from_millis(100), step: Duration::from_millis(50) }, 3, 200)]
    fn test_backoff_delay(#[case] backoff: Backoff, #[case] failures: u32, #[case] expected_ms: u64) {
        assert_eq!(backoff.delay(failures), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(policy(0).max_attempts(), 1);
    }
}
