use std::time::Duration;

/// `min(initial * 2^(attempt-1), max)` for a 1-based attempt number.
pub fn delay_for_attempt(initial: Duration, max: Duration, attempt: u32) -> Duration {
    debug_assert!(attempt >= 1, "attempt numbers are 1-based");
    let shift = attempt.saturating_sub(1).min(63);
    let millis = (initial.as_millis() as u64).saturating_mul(2u64.saturating_pow(shift));
    Duration::from_millis(millis).min(max)
}

/// Exponential backoff between consecutive failed launch attempts.
///
/// Deterministic by default; jitter is an opt-in for deployments where
/// many instances reconnect against the same remote host.
pub struct BackoffStrategy {
    initial: Duration,
    max: Duration,
    attempt: u32,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl BackoffStrategy {
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
            max_attempts: None,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before the next attempt, or `None` once the attempt bound
    /// is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        self.attempt += 1;
        let delay = delay_for_attempt(self.initial, self.max, self.attempt);

        if self.jitter {
            let factor = 0.5 + rand::random::<f64>() * 0.5;
            Some(Duration::from_secs_f64(delay.as_secs_f64() * factor))
        } else {
            Some(delay)
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts.is_some_and(|max| self.attempt >= max)
    }
}
