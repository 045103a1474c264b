use std::time::Duration;

/// Configures HTTP timeouts, polling and recovery behavior.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientOptions {
    /// Timeout for ordinary API requests, in milliseconds.
    pub request_timeout_ms: u64,
    /// Timeout for a single `/health` probe, in milliseconds.
    pub health_timeout_ms: u64,
    /// Timeout for the unread notification count request, in milliseconds.
    pub notification_timeout_ms: u64,
    /// Overall deadline for a basic data reload, in milliseconds.
    pub bulk_timeout_ms: u64,
    /// Interval between notification polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Location the embedding UI should navigate to once the session expires.
    pub session_redirect: String,
    pub retry: RetryPolicy,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: 15_000,
            health_timeout_ms: 8_000,
            notification_timeout_ms: 5_000,
            bulk_timeout_ms: 30_000,
            poll_interval_ms: 60_000,
            session_redirect: "/".to_owned(),
            retry: RetryPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// How [`retry_with_backoff`](crate::retry_with_backoff) re-runs a failed operation.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor applied to the delay for each further retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 3_000,
            backoff_multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default 1.5 multiplier.
    pub fn new(base_delay_ms: u64, max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exp);
        Duration::from_millis(delay_ms.round() as u64)
    }
}

/// Parameters of the automatic reconnect loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconnectPolicy {
    /// Health checks issued before giving up.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `base * 2^n` afterwards.
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay.
    pub max_delay_ms: u64,
    /// Delay between entering the severe state and the automatic reconnect.
    pub severe_reconnect_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            severe_reconnect_delay_ms: 2_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay after failed attempt number `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(32);
        let multiplier = 1u64 << exp;
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ReconnectPolicy, RetryPolicy};

    #[test]
    fn retry_delays_grow_by_half() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4_500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(6_750));
    }

    #[test]
    fn reconnect_defaults_match_portal_timings() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.severe_reconnect_delay_ms, 2_000);
        assert_eq!(policy.max_delay_ms, 10_000);
    }

    #[test]
    fn reconnect_delays_double_and_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| policy.delay_for(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2_000, 4_000, 8_000, 10_000, 10_000]);
        assert_eq!(policy.delay_for(200), Duration::from_millis(10_000));
    }
}
