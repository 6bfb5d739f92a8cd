//! Time source abstraction providing the monotonic clock and delays required by
//! bounded waits, runner idle sleeps, and the emulator's timeout logic.
use embassy_time::{Duration, Instant};
use futures_util::Future;

/// Shared clock; methods take `&self` so one instance serves every task.
pub trait Clock {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Asynchronously wait for `duration`.
    fn delay(&self, duration: Duration) -> impl Future<Output = ()> + '_;

    /// Convenience wrapper over [`Clock::delay`].
    fn delay_ms(&self, millis: u64) -> impl Future<Output = ()> + '_ {
        self.delay(Duration::from_millis(millis))
    }
}

/// Clock backed by the embassy time driver linked into the firmware.
#[cfg(feature = "embassy-clock")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embassy-clock")]
impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn delay(&self, duration: Duration) -> impl Future<Output = ()> + '_ {
        embassy_time::Timer::after(duration)
    }
}
