//! Bounded retry of a single remote call.
//!
//! Attempts run strictly one after another. Each attempt tries GET first for
//! simple actions, then POST; the outcome moves an explicit [`AttemptState`]
//! machine forward. Delays go through [`Sleeper`] so the loop does not depend
//! on a particular runtime timer.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::action::TransportKind;
use super::envelope::RequestEnvelope;
use super::error::{ApiError, RetryClass};
use super::normalize::{normalize, NormalizedResult};
use super::transport::Transport;

/// Delay primitive used between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
  async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
  async fn sleep(&self, duration: Duration) {
    if !duration.is_zero() {
      tokio::time::sleep(duration).await;
    }
  }
}

/// Attempt budget and linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub max_retries: u32,
  /// Base delay; attempt `n` (zero-based) waits `retry_delay * (n + 1)`.
  pub retry_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      retry_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  fn attempts(&self) -> u32 {
    self.max_retries.max(1)
  }

  pub fn backoff(&self, attempt: u32) -> Duration {
    self.retry_delay.saturating_mul(attempt.saturating_add(1))
  }

  /// State that follows a failed zero-based `attempt`.
  pub fn after_failure(&self, attempt: u32, err: ApiError) -> AttemptState {
    match err.retry_class() {
      RetryClass::Abort | RetryClass::Propagate => AttemptState::Failed(err),
      RetryClass::Retry if attempt + 1 < self.attempts() => AttemptState::Backoff {
        attempt,
        delay: self.backoff(attempt),
      },
      RetryClass::Retry => AttemptState::Failed(ApiError::Exhausted {
        attempts: self.attempts(),
        last: Box::new(err),
      }),
    }
  }
}

/// Position of a call in the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
  Attempting { attempt: u32 },
  Backoff { attempt: u32, delay: Duration },
  Succeeded(NormalizedResult),
  Failed(ApiError),
}

/// Drives one call through the retry loop.
#[derive(Clone)]
pub struct Orchestrator {
  transport: Arc<dyn Transport>,
  sleeper: Arc<dyn Sleeper>,
  policy: RetryPolicy,
}

impl Orchestrator {
  pub fn new(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
    Self {
      transport,
      sleeper,
      policy,
    }
  }

  /// Run the retry loop. `envelope` is called once per attempt so each attempt
  /// carries fresh credentials.
  pub async fn run<F>(&self, mut envelope: F) -> Result<NormalizedResult, ApiError>
  where
    F: FnMut() -> RequestEnvelope + Send,
  {
    let mut state = AttemptState::Attempting { attempt: 0 };

    loop {
      state = match state {
        AttemptState::Attempting { attempt } => {
          let request = envelope();
          debug!(action = %request.action, attempt = attempt + 1, "api call");
          match self.attempt(&request).await {
            Ok(result) => AttemptState::Succeeded(result),
            Err(err) => {
              warn!(action = %request.action, attempt = attempt + 1, error = %err, "api call failed");
              self.policy.after_failure(attempt, err)
            }
          }
        }
        AttemptState::Backoff { attempt, delay } => {
          self.sleeper.sleep(delay).await;
          AttemptState::Attempting {
            attempt: attempt + 1,
          }
        }
        AttemptState::Succeeded(result) => return Ok(result),
        AttemptState::Failed(err) => return Err(err),
      };
    }
  }

  /// One attempt: GET shortcut for simple actions, then POST.
  async fn attempt(&self, request: &RequestEnvelope) -> Result<NormalizedResult, ApiError> {
    if request.action.transport() == TransportKind::Get {
      let body = self.transport.send(TransportKind::Get, request).await?;
      match normalize(body) {
        Ok(result) if result.is_success() => {
          debug!(action = %request.action, "served by GET");
          return Ok(result);
        }
        Ok(result) => {
          debug!(action = %request.action, error = ?result.error(), "GET did not succeed, trying POST");
        }
        Err(err) => {
          debug!(action = %request.action, error = %err, "GET body unusable, trying POST");
        }
      }
    }

    let body: Value = self.transport.send(TransportKind::Post, request).await?;
    normalize(body)?.into_result()
  }
}
