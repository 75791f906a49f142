use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Attempt ceiling and delay schedule shared by reconnects and status polling.
///
/// `delay_for(n)` is the wait before retry `n` (0-based):
/// `base_delay * multiplier^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before the very first attempt.
    pub initial_delay: Duration,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Transport reconnects: 5 attempts, 1 s growing by 1.5x.
    pub fn reconnect() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::ZERO,
            base_delay: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Status polling after submission: 18 checks 10 s apart, about 3 minutes.
    pub fn polling() -> Self {
        Self {
            max_attempts: 18,
            initial_delay: Duration::from_secs(5),
            base_delay: Duration::from_secs(10),
            multiplier: 1.0,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Reload recovery: quick checks before falling back to regular polling.
    pub fn recovery() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::ZERO,
            base_delay: Duration::from_secs(2),
            multiplier: 1.0,
            max_delay: Duration::from_secs(2),
        }
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Worst-case wall-clock time before the policy gives up.
    pub fn total_budget(&self) -> Duration {
        (1..self.max_attempts).fold(self.initial_delay, |acc, retry| {
            acc + self.delay_for(retry - 1)
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::polling()
    }
}
