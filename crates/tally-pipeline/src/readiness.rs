//! Bounded readiness polling with exponential backoff.

use std::time::Duration;

use crate::{
  client::{ApiClient, ApiClientError},
  config::ReadinessSettings,
};

/// How long and how often to poll a starting service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
  pub max_attempts:  u32,
  pub initial_delay: Duration,
  pub max_delay:     Duration,
  pub multiplier:    f64,
}

impl RetryPolicy {
  /// Delay to wait after failed attempt number `attempt` (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let secs = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
    if secs >= self.max_delay.as_secs_f64() {
      return self.max_delay;
    }
    Duration::from_secs_f64(secs)
  }
}

impl From<&ReadinessSettings> for RetryPolicy {
  fn from(s: &ReadinessSettings) -> Self {
    Self {
      max_attempts:  s.max_attempts,
      initial_delay: Duration::from_millis(s.initial_delay_ms),
      max_delay:     Duration::from_millis(s.max_delay_ms),
      multiplier:    s.multiplier,
    }
  }
}

/// Probe `GET /data` until it answers or the policy's attempts run out.
///
/// Returns the number of attempts used, or `None` once the budget is spent.
/// A refused connection is the expected "still starting" signal; any other
/// failure is retried too, but logged louder.
pub async fn wait_until_ready(client: &ApiClient, policy: &RetryPolicy) -> Option<u32> {
  for attempt in 1..=policy.max_attempts {
    match client.list_records().await {
      Ok(_) => {
        tracing::info!(attempt, "serving API is ready");
        return Some(attempt);
      }
      Err(ApiClientError::NotReady(reason)) => {
        tracing::debug!(attempt, %reason, "serving API not ready yet");
      }
      Err(e) => {
        tracing::warn!(attempt, error = %e, "serving API readiness check failed");
      }
    }
    if attempt < policy.max_attempts {
      tokio::time::sleep(policy.delay_after(attempt)).await;
    }
  }
  None
}
