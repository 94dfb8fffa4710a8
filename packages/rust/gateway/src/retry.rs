//! Upstream failure taxonomy and backoff policy.

use std::time::Duration;

use pagegen_shared::GatewayConfig;

/// A failed attempt of one content-store call, as reported by the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The store answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        /// Explicit wait requested by the store (`Retry-After`).
        retry_after: Option<Duration>,
        message: String,
    },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Shorthand for a status failure without a body message.
    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            retry_after: None,
            message: String::new(),
        }
    }

    /// Only rate limiting (429) and server errors (5xx) are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Transport(_) | Self::Malformed(_) => false,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Exponential backoff with a ceiling on both delay and attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Ceiling on an upstream-requested `Retry-After` wait.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for RetryPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            max_retry_after: config.max_retry_after,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `min(base * 2^(retry-1), max)`,
    /// raised to `retry_after` when the store asked for a longer wait. The
    /// requested wait never exceeds `max_retry_after`.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let computed = self
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        match retry_after {
            Some(wait) => computed.max(wait.min(self.max_retry_after)),
            None => computed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(8000),
            max_retry_after: Duration::from_secs(60),
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let p = policy(1000);
        let delays: Vec<u128> = (1..=6).map(|k| p.delay_for(k, None).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 8000, 8000]);
    }

    #[test]
    fn smaller_base_follows_same_curve() {
        let p = policy(400);
        let delays: Vec<u128> = (1..=6).map(|k| p.delay_for(k, None).as_millis()).collect();
        assert_eq!(delays, vec![400, 800, 1600, 3200, 6400, 8000]);
    }

    #[test]
    fn retry_after_wins_only_when_larger() {
        let p = policy(1000);
        assert_eq!(
            p.delay_for(1, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            p.delay_for(3, Some(Duration::from_millis(100))),
            Duration::from_millis(4000)
        );
    }

    #[test]
    fn day_long_retry_after_is_clamped() {
        let p = policy(1000);
        assert_eq!(
            p.delay_for(1, Some(Duration::from_secs(86_400))),
            Duration::from_secs(60)
        );
        assert_eq!(
            p.delay_for(2, Some(Duration::from_secs(60))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn huge_retry_numbers_do_not_overflow() {
        let p = policy(1000);
        assert_eq!(p.delay_for(200, None), Duration::from_millis(8000));
    }

    #[test]
    fn retryable_classification() {
        assert!(UpstreamError::status(429).is_retryable());
        assert!(UpstreamError::status(500).is_retryable());
        assert!(UpstreamError::status(503).is_retryable());
        assert!(!UpstreamError::status(404).is_retryable());
        assert!(!UpstreamError::status(401).is_retryable());
        assert!(!UpstreamError::Transport("connection refused".into()).is_retryable());
        assert!(!UpstreamError::Malformed("expected `items`".into()).is_retryable());
    }
}
