//! Exponential backoff shared by the session manager and the controller error policy

use std::time::Duration;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Retry schedule for provider logins: 500ms doubling up to an hour
    pub fn login() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3600),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Calculate the backoff delay for a given retry attempt
    ///
    /// Delays never decrease with the attempt number as long as
    /// `multiplier * (1 - jitter) >= 1 + jitter`, which holds for the
    /// presets. Once the exponential base reaches `max_delay` the result is
    /// exactly `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max_secs = self.max_delay.as_secs_f64();

        // Calculate base delay with exponential backoff
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !base_delay_secs.is_finite() || base_delay_secs >= max_secs {
            return self.max_delay;
        }

        // Apply jitter
        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        // Cap at max delay
        Duration::from_secs_f64(delay_with_jitter.min(max_secs))
    }
}

/// Stateful retry cursor: each failure advances it, a success resets it
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay to wait before the next retry, advancing the cursor
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.config.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of consecutive failures recorded since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}
