//! Helpers for hosted targets (Linux single-board computers).

use std::time::Duration;

use embedded_hal::delay::DelayNs;

/// [`DelayNs`] backed by [`std::thread::sleep`].
///
/// Good enough for the retry delay and the wake sequence. Sampling the data
/// line needs a busy-waiting delay, since sleeping for a microsecond
/// typically overshoots by far more than a bit period.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms.into()));
    }
}
