//! Retry and backoff utilities for Gemini requests.
//!
//! Rate limits (429) honour `Retry-After`; gateway errors and transient
//! network failures back off exponentially.

use std::time::Duration;

/// Default number of retries for rate-limited or gateway-failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of retries for transient network errors.
pub const DEFAULT_NETWORK_RETRIES: u32 = 2;

/// Base delay for exponential backoff (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Maximum delay cap for exponential backoff (30 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// How many times, and how patiently, a request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub network_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            network_retries: DEFAULT_NETWORK_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            network_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs).min(self.backoff_max),
            None => calculate_backoff(attempt, self.backoff_base, self.backoff_max),
        }
    }
}

/// 502, 503 and 504 are usually temporary on Google's side.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

/// Determine if a reqwest error is a transient network error that should be retried.
///
/// Returns true for connection errors, timeouts, and failures during body transfer.
pub fn is_transient_network_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() || error.is_body() {
        return true;
    }

    error
        .status()
        .is_some_and(|status| is_retryable_status(status.as_u16()))
}

/// Parse the Retry-After header value to get retry delay in seconds.
///
/// Only the integer-seconds form is understood.
pub fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Calculate exponential backoff delay.
///
/// `min(base * 2^attempt + base / 2, max)`, with the half-base term capped
/// at 500ms.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter_ms = (base.as_millis() as u64).min(1000);
    let jitter = Duration::from_millis(jitter_ms / 2);
    exponential.saturating_add(jitter).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff_grows() {
        let first = calculate_backoff(0, Duration::from_secs(1), Duration::from_secs(30));
        let second = calculate_backoff(1, Duration::from_secs(1), Duration::from_secs(30));
        let third = calculate_backoff(2, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(first, Duration::from_millis(1500));
        assert_eq!(second, Duration::from_millis(2500));
        assert_eq!(third, Duration::from_millis(4500));
    }

    #[test]
    fn test_calculate_backoff_respects_max() {
        let delay = calculate_backoff(10, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(delay, Duration::from_secs(30));
    }

    #[test]
    fn test_calculate_backoff_with_small_base() {
        let delay = calculate_backoff(0, Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(delay, Duration::from_millis(150));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(502));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(504));
        assert!(!is_retryable_status(500));
        assert!(!is_retryable_status(429));
        assert!(!is_retryable_status(400));
    }

    #[test]
    fn test_policy_prefers_retry_after() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0, Some(7)), Duration::from_secs(7));
        assert_eq!(policy.delay(0, Some(600)), DEFAULT_BACKOFF_MAX);
        assert_eq!(policy.delay(1, None), Duration::from_millis(2500));
    }

    #[test]
    fn test_none_policy_disables_retries() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.network_retries, 0);
    }
}
