//! Retry policies for remote calls.
//!
//! Each component that talks to a flaky remote owns its own [`RetryPolicy`], so
//! the tag reconciler (many quick attempts) and the remote image check (few
//! attempts, paced, bounded overall) are configured independently.

use std::{cell::Cell, future::Future, time::Duration};

use backon::{ConstantBuilder, Retryable as _};
use serde::Deserialize;
use tracing::warn;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(from = "RetryPolicyDef")]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
    /// Bound on the whole sequence, sleeps included.
    pub timeout: Option<Duration>,
}

#[derive(Deserialize)]
struct RetryPolicyDef {
    max_attempts: usize,
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

impl From<RetryPolicyDef> for RetryPolicy {
    fn from(value: RetryPolicyDef) -> Self {
        Self {
            max_attempts: value.max_attempts,
            delay: Duration::from_millis(value.delay_ms),
            timeout: value.timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: E },
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl RetryPolicy {
    pub const fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            timeout: None,
        }
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Catalog fetch, creations and post update are cheap to redo, so retry
    /// immediately and often.
    pub const fn tag_reconciliation() -> Self {
        Self::new(10, Duration::ZERO)
    }

    pub const fn remote_image() -> Self {
        Self::new(3, Duration::from_secs(1)).with_timeout(Duration::from_secs(5))
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    /// Run `op` until it succeeds or the policy is used up.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = Cell::new(0usize);
        let counted = || {
            attempts.set(attempts.get() + 1);
            op()
        };
        let retry = counted
            .retry(self.backoff())
            .sleep(tokio::time::sleep)
            .notify(|error: &E, delay: Duration| {
                warn!(
                    label,
                    attempt = attempts.get(),
                    %error,
                    ?delay,
                    "attempt failed, retrying"
                );
            });
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, retry)
                .await
                .map_err(|_| RetryError::TimedOut(timeout))?,
            None => retry.await,
        };
        result.map_err(|last| RetryError::Exhausted {
            attempts: attempts.get(),
            last,
        })
    }
}
