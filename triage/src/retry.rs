//! Retry controller.
//!
//! Bounded retries with exponential backoff, written as an explicit state
//! machine so the sequence of attempts and delays can be inspected without a
//! runtime. Exhaustion is an outcome, not an error: the caller decides what to
//! put in place of the missing result.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

use crate::backend::traits::OracleError;
use crate::config::RetryConfig;
use crate::parser::ParseError;

/// A failed attempt, as seen by the retry controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptError {
    #[error("Oracle failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Unparseable response: {0}")]
    Parse(#[from] ParseError),
}

/// Attempt budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// A zero attempt budget is treated as one attempt.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt` (1-indexed): zero for the first, then
    /// `base * 2^(attempt - 2)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }
}

/// Where a retry run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt `n` is in flight
    Attempting(u32),
    /// Waiting `delay` before attempt `next`
    BackingOff { next: u32, delay: Duration },
    /// Attempt `n` succeeded
    Done(u32),
    /// All `n` attempts failed
    Exhausted(u32),
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Exhausted(_))
    }
}

/// Pure transition function for one retry run.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting(1),
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// The in-flight attempt succeeded.
    pub fn succeed(&mut self) -> RetryState {
        if let RetryState::Attempting(n) = self.state {
            self.state = RetryState::Done(n);
        }
        self.state
    }

    /// The in-flight attempt failed.
    pub fn fail(&mut self) -> RetryState {
        if let RetryState::Attempting(n) = self.state {
            self.state = if n >= self.policy.max_attempts {
                RetryState::Exhausted(n)
            } else {
                RetryState::BackingOff {
                    next: n + 1,
                    delay: self.policy.delay_before(n + 1),
                }
            };
        }
        self.state
    }

    /// The backoff delay has elapsed.
    pub fn resume(&mut self) -> RetryState {
        if let RetryState::BackingOff { next, .. } = self.state {
            self.state = RetryState::Attempting(next);
        }
        self.state
    }
}

/// Delay primitive, so the controller is not tied to one scheduler.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// How a retry run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T, E> {
    Done { value: T, attempts: u32 },
    Exhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Done { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Drives an operation through a [`RetryMachine`].
#[derive(Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-indexed attempt number. `label` ends up in the
    /// warning logged for every failed attempt.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut machine = RetryMachine::new(self.policy);
        let mut attempt = 1;

        loop {
            let error = match op(attempt).await {
                Ok(value) => {
                    machine.succeed();
                    return RetryOutcome::Done {
                        value,
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            match machine.fail() {
                RetryState::BackingOff { next, delay } => {
                    warn!(
                        label = label,
                        attempt = attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying..."
                    );
                    self.sleeper.sleep(delay).await;
                    machine.resume();
                    attempt = next;
                }
                _ => {
                    warn!(
                        label = label,
                        attempt = attempt,
                        error = %error,
                        "Final attempt failed"
                    );
                    return RetryOutcome::Exhausted {
                        last_error: error,
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Arc::new(TokioSleeper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));

        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
        assert_eq!(policy.delay_before(4), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(100, Duration::from_secs(2));
        assert_eq!(policy.delay_before(80), Duration::from_secs(2).saturating_mul(u32::MAX));
    }

    #[test]
    fn test_machine_transitions() {
        let mut machine = RetryMachine::new(RetryPolicy::new(2, Duration::from_millis(10)));

        assert_eq!(machine.state(), RetryState::Attempting(1));
        assert_eq!(
            machine.fail(),
            RetryState::BackingOff {
                next: 2,
                delay: Duration::from_millis(10)
            }
        );
        assert_eq!(machine.resume(), RetryState::Attempting(2));
        assert_eq!(machine.fail(), RetryState::Exhausted(2));
        assert!(machine.state().is_terminal());

        // Terminal states absorb further events
        assert_eq!(machine.succeed(), RetryState::Exhausted(2));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let mut machine = RetryMachine::new(RetryPolicy::new(0, Duration::from_secs(1)));
        assert_eq!(machine.fail(), RetryState::Exhausted(1));
    }

    #[tokio::test]
    async fn test_success_on_second_attempt() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let controller =
            RetryController::new(RetryPolicy::new(3, Duration::from_secs(2)), sleeper.clone());

        let outcome = controller
            .run("test", |attempt| async move {
                if attempt < 2 {
                    Err("boom")
                } else {
                    Ok(attempt * 10)
                }
            })
            .await;

        assert_eq!(outcome, RetryOutcome::Done { value: 20, attempts: 2 });
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_last_error() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let controller =
            RetryController::new(RetryPolicy::new(3, Duration::from_secs(2)), sleeper.clone());

        let outcome: RetryOutcome<(), String> = controller
            .run("test", |attempt| async move { Err(format!("failure {attempt}")) })
            .await;

        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                last_error: "failure 3".to_string(),
                attempts: 3
            }
        );
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_tokio_sleeper_waits() {
        tokio::time::pause();
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(4)).await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }
}
