//! Resilience wrapper for outbound provider calls.
//!
//! Every call gets a hard deadline; transient failures (see
//! [`ProviderError::is_transient`]) are retried up to `max_retries` times
//! with a linear backoff. Anything else is returned on the first failure.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ProviderError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Run `op` under this policy. `what` names the call in logs.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Timeout(self.timeout.as_secs())),
            };

            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(call = %what, attempt, error = %e, "transient provider failure, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
