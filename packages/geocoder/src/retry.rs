//! HTTP retry helpers for transient provider errors.
//!
//! Two layers are available:
//!
//! 1. **HTTP-level** ([`send_json`]): resends one request on connection
//!    errors, timeouts, and the configured retry-worthy statuses
//!    (by default 429, 500, 502, 503, 504), then parses the body as JSON.
//!    HTTP 403 is reported as [`GeocodeError::Blocked`] and never retried.
//! 2. **Operation-level** ([`with_retry`]): reruns a whole provider call
//!    while it fails with an error the policy retries
//!    ([`RetryPolicy::should_retry`]).
//!
//! # Usage
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url).query(&params), &policy).await?;
//!
//! let result = retry::with_retry(&policy, "census", || provider.geocode(&addr)).await;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::GeocodeError;

/// Statuses retried by [`send_json`] unless a policy overrides them.
pub const DEFAULT_RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "backoff", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// `step × attempt` (10s, 20s, 30s for a 10s step).
    Linear {
        /// Step in milliseconds.
        step_ms: u64,
    },
    /// `base × 2^(attempt-1)` (1s, 2s, 4s for a 1s base).
    Exponential {
        /// Base in milliseconds.
        base_ms: u64,
    },
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay schedule.
    #[serde(flatten)]
    pub backoff: Backoff,
    /// HTTP statuses that [`send_json`] resends.
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

const fn default_max_attempts() -> u32 {
    1
}

fn default_retry_statuses() -> Vec<u16> {
    DEFAULT_RETRY_STATUSES.to_vec()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
            retry_statuses: default_retry_statuses(),
        }
    }

    /// `max_attempts` attempts with linearly increasing delay.
    #[must_use]
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear {
                step_ms: millis(step),
            },
            retry_statuses: default_retry_statuses(),
        }
    }

    /// `max_attempts` attempts with exponentially increasing delay.
    #[must_use]
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base_ms: millis(base),
            },
            retry_statuses: default_retry_statuses(),
        }
    }

    /// Total attempts, at least one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Linear { step_ms } => {
                Duration::from_millis(step_ms.saturating_mul(u64::from(attempt)))
            }
            Backoff::Exponential { base_ms } => {
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                Duration::from_millis(base_ms.saturating_mul(factor))
            }
        }
    }

    fn retries_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Whether `err` is worth another attempt under this policy.
    ///
    /// Status errors are retried only when listed in `retry_statuses`.
    /// Every other error defers to [`GeocodeError::is_retryable`].
    #[must_use]
    pub fn should_retry(&self, err: &GeocodeError) -> bool {
        match err {
            GeocodeError::Status { status } => !err.is_blocked() && self.retries_status(*status),
            _ => err.is_retryable(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// # Errors
///
/// Returns [`GeocodeError::Blocked`] on HTTP 403, [`GeocodeError::Status`]
/// for other non-success statuses (after retries for retry-worthy ones),
/// [`GeocodeError::Http`] if the connection fails after all retries, and
/// [`GeocodeError::Parse`] if the body is not valid JSON.
pub async fn send_json<F>(
    build_request: F,
    policy: &RetryPolicy,
) -> Result<serde_json::Value, GeocodeError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let response = send_inner(&build_request, policy).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::warn!("JSON parse failed for {url}: {e}\n  body preview: {preview}");
        GeocodeError::Parse {
            message: format!("invalid JSON from {url}: {e}"),
        }
    })
}

/// Core retry loop behind [`send_json`].
async fn send_inner<F>(
    build_request: &F,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, GeocodeError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let attempts = policy.attempts();

    for attempt in 1..=attempts {
        let last = attempt == attempts;

        match build_request().send().await {
            Err(e) => {
                let err = GeocodeError::Http(e);
                if last || !err.is_retryable() {
                    return Err(err);
                }
                log::warn!("  transient error: {err}");
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::FORBIDDEN {
                    let body = response.text().await.unwrap_or_default();
                    let preview: String = body.chars().take(BODY_PREVIEW_LEN).collect();
                    return Err(GeocodeError::Blocked {
                        message: format!("HTTP {status}: {preview}"),
                    });
                }

                if policy.retries_status(status.as_u16()) {
                    if last {
                        return Err(GeocodeError::Status {
                            status: status.as_u16(),
                        });
                    }
                    log::warn!("  HTTP {status}");
                } else if status.is_client_error() || status.is_server_error() {
                    return Err(GeocodeError::Status {
                        status: status.as_u16(),
                    });
                } else {
                    return Ok(response);
                }
            }
        }

        let delay = policy.delay_after(attempt);
        log::warn!("  retry {attempt}/{} in {delay:?}...", attempts - 1);
        tokio::time::sleep(delay).await;
    }

    unreachable!("send_inner retry loop exited without returning")
}

/// Reruns `op` while it fails with an error `policy` retries.
///
/// Blocked errors and statuses outside `retry_statuses` are returned
/// immediately. The delay
/// between attempts follows `policy`.
///
/// # Errors
///
/// Returns the last [`GeocodeError`] once attempts are exhausted or a
/// non-retryable error occurs.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, GeocodeError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, GeocodeError>> + Send,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && policy.should_retry(&e) => {
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "{label}: attempt {attempt}/{attempts} failed ({e}), retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn linear_backoff_grows_by_step() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(10));
        assert_eq!(policy.delay_after(1), Duration::from_secs(10));
        assert_eq!(policy.delay_after(2), Duration::from_secs(20));
        assert_eq!(policy.delay_after(3), Duration::from_secs(30));
    }

    #[test]
    fn exponential_backoff_doubles() {
        let policy = RetryPolicy::exponential(4, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn zero_attempts_means_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::none()
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn deserializes_flattened_backoff() {
        let policy: RetryPolicy =
            toml::from_str("max_attempts = 3\nbackoff = \"linear\"\nstep_ms = 10000\n").unwrap();
        assert_eq!(policy, RetryPolicy::linear(3, Duration::from_secs(10)));
        assert_eq!(policy.retry_statuses, DEFAULT_RETRY_STATUSES);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(3, Duration::from_secs(10));

        let result = with_retry(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GeocodeError::Status { status: 503 })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(2, Duration::from_secs(1));

        let result: Result<(), _> = with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GeocodeError::RateLimited) }
        })
        .await;

        assert!(matches!(result, Err(GeocodeError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_honors_configured_statuses() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            retry_statuses: vec![502],
            ..RetryPolicy::linear(3, Duration::from_secs(1))
        };

        let result: Result<(), _> = with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GeocodeError::Status { status: 503 }) }
        })
        .await;

        assert!(matches!(result, Err(GeocodeError::Status { status: 503 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        calls.store(0, Ordering::SeqCst);
        let result: Result<(), _> = with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GeocodeError::Status { status: 502 }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_status_list_disables_status_retries() {
        let calls = AtomicU32::new(0);
        let policy: RetryPolicy = toml::from_str(
            "max_attempts = 4\nbackoff = \"none\"\nretry_statuses = []\n",
        )
        .unwrap();

        let result: Result<(), _> = with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GeocodeError::Status { status: 503 }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_does_not_retry_blocks() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(5, Duration::from_secs(1));

        let result: Result<(), _> = with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GeocodeError::Blocked {
                    message: "HTTP 403".to_string(),
                })
            }
        })
        .await;

        assert!(result.unwrap_err().is_blocked());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
