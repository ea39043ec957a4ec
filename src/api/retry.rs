use crate::config::ApiConfig;
use crate::error::ApiError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-attempt deadline and backoff bounds shared by every API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Extra attempts after a 5xx; total attempts are `retries + 1`
    pub retries: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retries: config.retries,
            backoff_min: Duration::from_millis(config.backoff_min_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Random delay within the configured bounds
    pub fn backoff(&self) -> Duration {
        let min = self.backoff_min.as_millis() as u64;
        let max = (self.backoff_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

/// Run `op` under `policy`.
///
/// Each attempt races its deadline and `cancel`. Only 5xx responses are
/// retried; anything else, including a timeout, is returned as-is. Cancelling
/// during a backoff returns `ApiError::Cancelled` without another attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match run_attempt(policy.timeout, cancel, op()).await {
            Err(e) if e.is_server_error() && attempt <= policy.retries => {
                let delay = policy.backoff();
                tracing::warn!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    policy.retries + 1,
                    e,
                    delay
                );
                if !sleep_unless_cancelled(delay, cancel).await {
                    tracing::debug!("Retry loop cancelled during backoff");
                    return Err(ApiError::Cancelled);
                }
            }
            result => return result,
        }
    }
}

async fn run_attempt<T>(
    timeout: Duration,
    cancel: Option<&CancellationToken>,
    attempt: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    let deadline = async {
        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(timeout.as_millis() as u64)),
        }
    };

    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::Cancelled),
                result = deadline => result,
            }
        }
        None => deadline.await,
    }
}

/// False if cancelled before the delay elapsed
async fn sleep_unless_cancelled(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}
