//! Cancellation signals for the retrying reader.
//!
//! A signal is checked before every attempt and while waiting between
//! attempts. It never interrupts a capture that has already started.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use fugit::MillisDurationU32;

/// Granularity of the default [`Cancel::wait`].
pub const POLL_INTERVAL: MillisDurationU32 = MillisDurationU32::from_ticks(10);

/// An externally driven "stop now" signal.
pub trait Cancel {
    /// Whether cancellation has been requested.
    fn is_cancelled(&self) -> bool;

    /// Waits for `period` unless cancelled first.
    ///
    /// Returns `true` if cancellation was observed. The default implementation
    /// sleeps on `delay` in [`POLL_INTERVAL`] slices and checks the signal
    /// between slices.
    fn wait<D: DelayNs>(&self, delay: &mut D, period: MillisDurationU32) -> bool {
        let mut remaining = period.ticks();
        while remaining > 0 {
            if self.is_cancelled() {
                return true;
            }
            let step = remaining.min(POLL_INTERVAL.ticks());
            delay.delay_ms(step);
            remaining -= step;
        }
        self.is_cancelled()
    }
}

impl<T: Cancel + ?Sized> Cancel for &T {
    fn is_cancelled(&self) -> bool {
        T::is_cancelled(self)
    }

    fn wait<D: DelayNs>(&self, delay: &mut D, period: MillisDurationU32) -> bool {
        T::wait(self, delay, period)
    }
}

/// Flag set from an interrupt handler or another thread.
impl Cancel for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// A signal that never fires.
#[derive(Clone, Copy, Debug, Default)]
pub struct Never;

impl Cancel for Never {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[cfg(feature = "std")]
pub use self::token::CancellationToken;

#[cfg(feature = "std")]
mod token {
    use std::sync::{Arc, Condvar, Mutex, PoisonError};
    use std::time::Duration;

    use embedded_hal::delay::DelayNs;
    use fugit::MillisDurationU32;

    use super::Cancel;

    /// Cloneable cancellation token.
    ///
    /// [`Cancel::wait`] blocks on a condition variable instead of the delay
    /// provider, so [`cancel`](Self::cancel) wakes a waiting reader at once.
    #[derive(Clone, Debug, Default)]
    pub struct CancellationToken {
        inner: Arc<(Mutex<bool>, Condvar)>,
    }

    impl CancellationToken {
        /// Creates a token that has not been cancelled.
        pub fn new() -> Self {
            Self::default()
        }

        /// Requests cancellation and wakes every waiter.
        pub fn cancel(&self) {
            let (flag, cvar) = &*self.inner;
            *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
            cvar.notify_all();
        }
    }

    impl Cancel for CancellationToken {
        fn is_cancelled(&self) -> bool {
            let (flag, _) = &*self.inner;
            *flag.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn wait<D: DelayNs>(&self, _delay: &mut D, period: MillisDurationU32) -> bool {
            let (flag, cvar) = &*self.inner;
            let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
            let timeout = Duration::from_millis(period.ticks().into());
            let (guard, _) = cvar
                .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
                .unwrap_or_else(PoisonError::into_inner);
            *guard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use embedded_hal_mock::eh1::delay::CheckedDelay;
    use embedded_hal_mock::eh1::delay::Transaction as DelayTx;

    /// Fires after being polled `after` times.
    struct FiresAfter {
        polls: Cell<u32>,
        after: u32,
    }

    impl Cancel for FiresAfter {
        fn is_cancelled(&self) -> bool {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            polls > self.after
        }
    }

    #[test]
    fn test_wait_runs_full_period() {
        let delay_transactions = vec![
            DelayTx::delay_ms(10),
            DelayTx::delay_ms(10),
            DelayTx::delay_ms(5),
        ];
        let mut delay = CheckedDelay::new(&delay_transactions);

        assert!(!Never.wait(&mut delay, MillisDurationU32::from_ticks(25)));

        delay.done();
    }

    #[test]
    fn test_wait_stops_when_cancelled() {
        let delay_transactions = vec![DelayTx::delay_ms(10), DelayTx::delay_ms(10)];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let signal = FiresAfter {
            polls: Cell::new(0),
            after: 2,
        };
        assert!(signal.wait(&mut delay, MillisDurationU32::from_ticks(1500)));
        assert_eq!(signal.polls.get(), 3);

        delay.done();
    }

    #[test]
    fn test_wait_already_cancelled() {
        let delay_transactions: Vec<DelayTx> = vec![];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let flag = AtomicBool::new(true);
        assert!(flag.wait(&mut delay, MillisDurationU32::from_ticks(1500)));

        delay.done();
    }

    #[test]
    fn test_atomic_flag() {
        let flag = AtomicBool::new(false);
        assert!(!flag.is_cancelled());
        flag.store(true, Ordering::Release);
        assert!(flag.is_cancelled());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_token_wakes_waiter() {
        use embedded_hal_mock::eh1::delay::NoopDelay;
        use std::time::{Duration, Instant};

        let token = CancellationToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let started = Instant::now();
        assert!(token.wait(&mut NoopDelay, MillisDurationU32::from_ticks(60_000)));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert!(token.is_cancelled());

        canceller.join().unwrap();
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_token_times_out() {
        use embedded_hal_mock::eh1::delay::NoopDelay;

        let token = CancellationToken::new();
        assert!(!token.wait(&mut NoopDelay, MillisDurationU32::from_ticks(1)));
    }
}
