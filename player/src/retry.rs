//! Abortable retry with exponential backoff.
//!
//! Backoff sleeps race the generation's cancellation token, and the
//! generation is re-checked after every attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::{ErrorCode, PlayerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::generation::{Generation, GenerationCounter};

/// Retry policy for manifest requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub base_delay: Duration,

    /// Multiplier applied to the delay after each retry
    pub backoff_factor: f64,

    /// Random jitter, as a fraction of the delay, applied in both directions
    pub fuzz_factor: f64,

    /// Per-attempt timeout; an attempt that exceeds it counts as recoverable
    #[serde(with = "crate::serde_helpers::optional_duration")]
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            fuzz_factor: 0.5,
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempts` failed attempts.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);

        let fuzz = if self.fuzz_factor > 0.0 {
            self.fuzz_factor * (rand::random::<f64>() * 2.0 - 1.0)
        } else {
            0.0
        };

        Duration::from_millis((delay_ms * (1.0 + fuzz)).max(0.0) as u64)
    }
}

/// Result of a single attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T> {
    Success(T),
    Recoverable(PlayerError),
    Fatal(PlayerError),
}

/// Bookkeeping for one retried operation
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempts: u32,
    pub last_error: Option<PlayerError>,
    pub generation: Generation,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryFailure {
    /// The owning generation was superseded; the result must be discarded.
    #[error("operation superseded by a newer generation")]
    Superseded,

    #[error("operation failed after {attempts} attempt(s): {error}")]
    Failed { error: PlayerError, attempts: u32 },
}

/// Runs an operation under a generation-tagged retry policy.
///
/// The generation is re-checked before every attempt and after every
/// suspension. Backoff timers are raced against the generation's cancellation
/// token, so superseding a generation drops its queued retry immediately. An
/// attempt that is already running is not interrupted; its result is discarded
/// if it arrives stale.
pub struct RetryController {
    policy: RetryPolicy,
    generations: Arc<GenerationCounter>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, generations: Arc<GenerationCounter>) -> Self {
        Self {
            policy,
            generations,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<T, F, Fut>(
        &self,
        generation: Generation,
        mut attempt: F,
    ) -> Result<(T, RetryState), RetryFailure>
    where
        F: FnMut(Generation) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let token = self.generations.token_for(generation);
        let mut state = RetryState {
            attempts: 0,
            last_error: None,
            generation,
        };

        loop {
            if !self.generations.is_current(generation) {
                debug!("Dropping attempt for stale {}", generation);
                return Err(RetryFailure::Superseded);
            }

            state.attempts += 1;
            let outcome = match self.policy.timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt(generation)).await {
                    Ok(outcome) => outcome,
                    Err(_) => AttemptOutcome::Recoverable(PlayerError::recoverable(
                        ErrorCode::Timeout,
                        format!("attempt timed out after {:?}", limit),
                    )),
                },
                None => attempt(generation).await,
            };

            if !self.generations.is_current(generation) {
                debug!("Discarding result of attempt {} for stale {}", state.attempts, generation);
                return Err(RetryFailure::Superseded);
            }

            let error = match outcome {
                AttemptOutcome::Success(value) => return Ok((value, state)),
                AttemptOutcome::Fatal(error) => {
                    return Err(RetryFailure::Failed {
                        error,
                        attempts: state.attempts,
                    })
                }
                AttemptOutcome::Recoverable(error) => error,
            };

            if state.attempts >= self.policy.max_attempts {
                return Err(RetryFailure::Failed {
                    error,
                    attempts: state.attempts,
                });
            }

            let delay = self.policy.delay_for(state.attempts);
            debug!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                state.attempts, self.policy.max_attempts, generation, error, delay
            );
            state.last_error = Some(error);

            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Retry timer for {} cancelled", generation);
                    return Err(RetryFailure::Superseded);
                }
                _ = sleep(delay) => {}
            }
        }
    }
}
