//! Bounded waits: race any future against a [`Clock`] delay.
//!
//! Every lock and queue wait in the crate goes through [`within`], so contention and
//! backpressure degrade to "drop and log" instead of blocking a task indefinitely.
use crate::protocol::transport::traits::clock::Clock;
use futures_util::future::{select, Either};
use futures_util::pin_mut;
use futures_util::Future;

/// Resolve `future` unless `millis` elapse first; `None` on timeout.
///
/// The future is polled before the delay, so an immediately ready future always wins.
pub async fn within<K: Clock, F: Future>(clock: &K, millis: u64, future: F) -> Option<F::Output> {
    let delay = clock.delay_ms(millis);
    pin_mut!(future);
    pin_mut!(delay);

    match select(future, delay).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}
