use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Bounded retry with a fixed delay, applied only to retryable service errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first call included
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts. `call` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        kind = %err.kind,
                        delay_ms = self.delay_ms,
                        "Service call failed, retrying"
                    );
                    tokio::time::sleep(self.delay()).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::debug!(operation, attempt, kind = %err.kind, "Service call failed");
                    return Err(err);
                }
            }
        }
    }
}
