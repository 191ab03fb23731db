//! HTTP retry helpers for transient errors.
//!
//! Hazard fetchers call [`send_json`] instead of
//! `reqwest::RequestBuilder::send()` directly so connection failures,
//! timeouts, rate limiting and server errors get retried with exponential
//! backoff.
//!
//! A catalog fetch sits inside the alerting loop, so the default budget is
//! two quick retries before the caller falls back to fixtures.
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url).query(&params), &policy).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Bytes of an unparseable body echoed into the log.
const BODY_PREVIEW_LEN: usize = 500;

/// How many times, and how patiently, to retry a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Sends the request built by `build_request`, retrying per `policy`, and
/// decodes the body as JSON.
///
/// `build_request` runs once per attempt because `.send()` consumes the
/// builder.
///
/// # Errors
///
/// Returns [`SourceError`] once retries are exhausted, on a permanent
/// non-success status, or when the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    build_request: F,
    policy: &RetryPolicy,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_with_retries(&build_request, policy).await?;
    let url = response.url().clone();
    let body = response.text().await?;

    serde_json::from_str(&body).map_err(|e| {
        log::warn!(
            "Catalog response from {url} is not JSON ({e}), {} bytes: {}",
            body.len(),
            preview(&body)
        );
        SourceError::Json(e)
    })
}

/// First `BODY_PREVIEW_LEN` bytes of `body`, cut on a char boundary.
fn preview(body: &str) -> &str {
    if body.len() <= BODY_PREVIEW_LEN {
        return body;
    }
    let cut = (0..=BODY_PREVIEW_LEN)
        .rev()
        .find(|i| body.is_char_boundary(*i))
        .unwrap_or(0);
    &body[..cut]
}

/// Returns the first 2xx response.
#[allow(clippy::future_not_send)]
async fn send_with_retries<F>(
    build_request: &F,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            log::warn!("Retrying catalog request ({attempt}/{max_retries}) in {delay:?}");
            tokio::time::sleep(delay).await;
        }

        let error = match build_request().send().await {
            Err(e) if is_transient(&e) => {
                log::warn!("Catalog request failed: {e}");
                SourceError::Http(e)
            }
            Err(e) => return Err(SourceError::Http(e)),
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                if !is_retryable_status(status) {
                    return Err(SourceError::Status {
                        status: status.as_u16(),
                    });
                }
                log::warn!("Catalog request returned {status}");
                SourceError::Status {
                    status: status.as_u16(),
                }
            }
        };

        if attempt >= max_retries {
            return Err(error);
        }
        attempt += 1;
    }
}

/// 429 and 5xx are worth another try; every other non-2xx is permanent.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Connection-level failures that may succeed on another attempt.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
