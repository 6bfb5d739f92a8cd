//! Adaptive response timeout.
//!
//! Response latency is smoothed with an exponentially weighted moving average
//! (`avg' = (avg * 7 + sample * 3) / 10`) and the timeout is four times the average,
//! clamped to [`MIN_TIMEOUT_MS`]..=[`MAX_TIMEOUT_MS`].
use crate::protocol::elm327::{MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeoutEstimator {
    average_ms: u32,
}

impl TimeoutEstimator {
    /// Estimator consistent with the current `timeout_ms`.
    pub const fn new(timeout_ms: u32) -> Self {
        Self {
            average_ms: timeout_ms / 4,
        }
    }

    /// Forget the history and restart from `timeout_ms`.
    pub fn reset(&mut self, timeout_ms: u32) {
        *self = Self::new(timeout_ms);
    }

    pub fn average_ms(&self) -> u32 {
        self.average_ms
    }

    /// Feed one latency sample; returns the new timeout.
    pub fn update(&mut self, sample_ms: u64) -> u32 {
        let sample = sample_ms.min(u32::MAX as u64);
        let average = (self.average_ms as u64 * 7 + sample * 3) / 10;
        self.average_ms = average as u32;
        (average * 4).clamp(MIN_TIMEOUT_MS as u64, MAX_TIMEOUT_MS as u64) as u32
    }
}
