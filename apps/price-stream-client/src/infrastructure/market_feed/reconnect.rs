//! Reconnection Policy
//!
//! Decides whether and when to retry after the connection closes. The
//! decision itself is a pure function of the attempt count and the
//! configuration; [`ReconnectPolicy`] carries the attempt count between
//! closures and resets it whenever a connection is established.
//!
//! The default is a fixed delay with a bounded number of attempts. A
//! multiplier above `1.0` turns it into exponential backoff capped at
//! `max_interval`.

use std::time::Duration;

use rand::Rng;

/// Default number of automatic reconnect attempts.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of automatic reconnect attempts (0 = never retry).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub interval: Duration,
    /// Growth factor applied per attempt (1.0 = fixed delay).
    pub multiplier: f64,
    /// Upper bound for the delay when `multiplier` grows it.
    pub max_interval: Duration,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            interval: DEFAULT_RECONNECT_INTERVAL,
            multiplier: 1.0,
            max_interval: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Fixed-delay configuration with a bounded attempt count.
    #[must_use]
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ..Self::default()
        }
    }

    /// Replace unusable float settings.
    ///
    /// A non-finite or sub-unit `multiplier` becomes `1.0`. A non-finite
    /// `jitter_factor` becomes `0.0`, otherwise it is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            self.multiplier = 1.0;
        }
        self.jitter_factor = if self.jitter_factor.is_finite() {
            self.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Outcome of a reconnection decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule one attempt after the delay.
    Retry(Duration),
    /// Retry budget exhausted.
    GiveUp,
}

/// Decide what to do after a closure, given how many retries already ran.
///
/// `attempt_count` is the number of retries scheduled since the last
/// successful connection.
#[must_use]
pub fn decide(attempt_count: u32, config: &ReconnectConfig) -> RetryDecision {
    if attempt_count >= config.max_attempts {
        return RetryDecision::GiveUp;
    }

    RetryDecision::Retry(scaled_interval(attempt_count, config))
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scaled_interval(attempt_count: u32, config: &ReconnectConfig) -> Duration {
    if config.multiplier <= 1.0 {
        return config.interval;
    }

    let exponent = i32::try_from(attempt_count).unwrap_or(i32::MAX);
    let scaled = (config.interval.as_millis() as f64 * config.multiplier.powi(exponent)).round();
    let max_millis = config.max_interval.as_millis();
    let millis = if scaled.is_finite() && scaled > 0.0 {
        (scaled as u128).min(max_millis)
    } else {
        max_millis
    };

    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

/// Retry state carried across closures.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use price_stream_client::infrastructure::market_feed::reconnect::{
///     ReconnectConfig, ReconnectPolicy, RetryDecision,
/// };
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(2, Duration::from_millis(100)));
///
/// assert_eq!(policy.on_closure(), RetryDecision::Retry(Duration::from_millis(100)));
/// assert_eq!(policy.on_closure(), RetryDecision::Retry(Duration::from_millis(100)));
/// assert_eq!(policy.on_closure(), RetryDecision::GiveUp);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    ///
    /// The configuration is passed through [`ReconnectConfig::sanitized`].
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config: config.sanitized(),
            attempt_count: 0,
        }
    }

    /// Record a closure and decide whether to retry.
    ///
    /// The attempt count is incremented only when a retry is scheduled.
    pub fn on_closure(&mut self) -> RetryDecision {
        match decide(self.attempt_count, &self.config) {
            RetryDecision::Retry(delay) => {
                self.attempt_count += 1;
                RetryDecision::Retry(self.apply_jitter(delay))
            }
            RetryDecision::GiveUp => RetryDecision::GiveUp,
        }
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if another closure would be retried.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.attempt_count < self.config.max_attempts
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        if !jitter_range.is_finite() {
            return duration;
        }
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
