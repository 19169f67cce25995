use core::fmt::Debug;

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};
use fugit::{MicrosDurationU32, MillisDurationU32};

use crate::error::CaptureError;
use crate::pulse::{Level, Pulse, PulseSequence};

/// Most edges [`HalCapture`] records before giving up on a line that never
/// goes idle. Matches the buffer size of typical native capture routines.
pub const MAX_EDGES: usize = 16_000;

/// Source of raw pulse captures.
///
/// Implementations wake the sensor on `pin` and record every level change on
/// the data line until it goes idle. A capture must run to completion once
/// started; retrying and interpreting the pulses is left to the caller.
pub trait PulseCapture {
    /// Capture failure reported by the hardware layer.
    type Error: Debug;

    /// Wakes the sensor and returns the pulses it sent back.
    ///
    /// `boost` requests elevated scheduling for the duration of the capture,
    /// which slow hosts need to sample at microsecond resolution.
    fn capture(&mut self, pin: u32, boost: bool) -> Result<PulseSequence, Self::Error>;
}

impl<T: PulseCapture + ?Sized> PulseCapture for &mut T {
    type Error = T::Error;

    fn capture(&mut self, pin: u32, boost: bool) -> Result<PulseSequence, Self::Error> {
        T::capture(self, pin, boost)
    }
}

/// Copies a native `[level, duration_us, level, duration_us, ...]` buffer
/// into an owned [`PulseSequence`].
///
/// Native capture routines hand back a buffer they allocated themselves.
/// Call this before releasing it so nothing downstream borrows native memory.
/// Any non-zero level is high. Buffers longer than
/// [`MAX_PULSES`](crate::MAX_PULSES) pairs are counted in full and left for
/// the decoder to reject.
///
/// # Errors
///
/// [`CaptureError::MalformedBuffer`] for an odd length or a negative duration.
pub fn pulses_from_raw<E: Debug>(raw: &[i32]) -> Result<PulseSequence, CaptureError<E>> {
    if raw.len() % 2 != 0 {
        return Err(CaptureError::MalformedBuffer { len: raw.len() });
    }

    let mut pulses = PulseSequence::new();
    for pair in raw.chunks_exact(2) {
        let duration_us =
            u32::try_from(pair[1]).map_err(|_| CaptureError::MalformedBuffer { len: raw.len() })?;
        pulses.push(Pulse::new(Level::from(pair[0] != 0), duration_us));
    }

    Ok(pulses)
}

/// Elevated scheduling could not be obtained.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoostError;

/// Raises the priority of the capturing thread while sampling.
///
/// On Linux this is typically `sched_setscheduler` with `SCHED_FIFO`, which
/// needs root or `CAP_SYS_NICE`. On a bare-metal target it can mask interrupts.
pub trait SchedulerBoost {
    /// Enters the high priority mode.
    fn raise(&mut self) -> Result<(), BoostError>;

    /// Returns to normal priority.
    fn restore(&mut self);
}

/// Boost that does nothing, for targets where sampling is already precise.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBoost;

impl SchedulerBoost for NoBoost {
    fn raise(&mut self) -> Result<(), BoostError> {
        Ok(())
    }

    fn restore(&mut self) {}
}

/// Timing of the wake sequence and the sampling window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureTiming {
    /// How long the line is held high before the start signal.
    pub settle: MillisDurationU32,
    /// Length of the low start signal. DHT11 needs at least 18ms.
    pub start_low: MillisDurationU32,
    /// Sampling stops once the line holds one level this long.
    pub idle_timeout: MicrosDurationU32,
    /// Interval between two samples of the line.
    pub sample_step: MicrosDurationU32,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        CaptureTiming {
            settle: MillisDurationU32::from_ticks(500),
            start_low: MillisDurationU32::from_ticks(18),
            idle_timeout: MicrosDurationU32::from_ticks(10_000),
            sample_step: MicrosDurationU32::from_ticks(1),
        }
    }
}

impl CaptureTiming {
    /// Sets how long the line is held high before the start signal.
    pub fn with_settle(mut self, settle: MillisDurationU32) -> Self {
        self.settle = settle;
        self
    }

    /// Sets the length of the low start signal.
    pub fn with_start_low(mut self, start_low: MillisDurationU32) -> Self {
        self.start_low = start_low;
        self
    }

    /// Sets how long the line must hold one level to end the capture.
    pub fn with_idle_timeout(mut self, idle_timeout: MicrosDurationU32) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets the sampling interval. Pulse durations are multiples of it.
    ///
    /// Zero is treated as 1us.
    pub fn with_sample_step(mut self, sample_step: MicrosDurationU32) -> Self {
        self.sample_step = sample_step;
        self
    }
}

/// Pulse capture over an [`embedded-hal`](embedded_hal) pin.
///
/// The pin must work in open-drain mode: `set_high` releases the line to the
/// pull-up so the sensor can drive it. Durations are measured by sampling the
/// line once per [`CaptureTiming::sample_step`] (1us by default), so their
/// accuracy is that of the delay provider.
pub struct HalCapture<PIN, D, B = NoBoost> {
    pin_id: u32,
    pin: PIN,
    delay: D,
    boost: B,
    timing: CaptureTiming,
}

impl<PIN, D> HalCapture<PIN, D, NoBoost> {
    /// Creates a capture adapter for the sensor wired to `pin`.
    ///
    /// # Arguments
    ///
    /// * `pin_id` - The GPIO number callers use to address this sensor.
    /// * `pin` - The GPIO pin connected to the data line. Must support both input and output.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    pub fn new(pin_id: u32, pin: PIN, delay: D) -> Self {
        HalCapture {
            pin_id,
            pin,
            delay,
            boost: NoBoost,
            timing: CaptureTiming::default(),
        }
    }
}

impl<PIN, D, B> HalCapture<PIN, D, B> {
    /// Replaces the scheduling boost used when a capture asks for it.
    pub fn with_boost<B2: SchedulerBoost>(self, boost: B2) -> HalCapture<PIN, D, B2> {
        HalCapture {
            pin_id: self.pin_id,
            pin: self.pin,
            delay: self.delay,
            boost,
            timing: self.timing,
        }
    }

    /// Replaces the wake and sampling timing.
    pub fn with_timing(mut self, timing: CaptureTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Releases the pin, delay and boost.
    pub fn release(self) -> (PIN, D, B) {
        (self.pin, self.delay, self.boost)
    }
}

impl<PIN, D, B, E> HalCapture<PIN, D, B>
where
    PIN: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayNs,
    B: SchedulerBoost,
    E: Debug,
{
    /// Sends the start signal and releases the line to the sensor.
    fn start(&mut self) -> Result<(), CaptureError<E>> {
        self.pin.set_high()?;
        self.delay.delay_ms(self.timing.settle.ticks());
        self.pin.set_low()?;
        self.delay.delay_ms(self.timing.start_low.ticks());
        self.pin.set_high()?;
        Ok(())
    }

    /// Records every level change until the line goes idle.
    ///
    /// The last pulse is reported with the idle timeout as its duration.
    fn sample(&mut self) -> Result<PulseSequence, CaptureError<E>> {
        let step = self.timing.sample_step.ticks().max(1);
        let idle = self.timing.idle_timeout.ticks().max(1);
        let mut pulses = PulseSequence::new();

        let mut level = Level::from(self.pin.is_high()?);
        let mut held: u32 = step;

        loop {
            self.delay.delay_us(step);
            let next = Level::from(self.pin.is_high()?);

            if next != level {
                Self::record(&mut pulses, Pulse::new(level, held))?;
                level = next;
                held = step;
                continue;
            }

            held = held.saturating_add(step);
            if held > idle {
                Self::record(&mut pulses, Pulse::new(level, idle))?;
                break;
            }
        }

        if pulses.len() < 2 {
            return Err(CaptureError::NoResponse);
        }
        Ok(pulses)
    }

    fn record(pulses: &mut PulseSequence, pulse: Pulse) -> Result<(), CaptureError<E>> {
        if pulses.len() >= MAX_EDGES {
            return Err(CaptureError::Overflow {
                capacity: MAX_EDGES,
            });
        }
        pulses.push(pulse);
        Ok(())
    }

    fn wake_and_sample(&mut self) -> Result<PulseSequence, CaptureError<E>> {
        self.start()?;
        self.sample()
    }
}

impl<PIN, D, B, E> PulseCapture for HalCapture<PIN, D, B>
where
    PIN: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayNs,
    B: SchedulerBoost,
    E: Debug,
{
    type Error = CaptureError<E>;

    fn capture(&mut self, pin: u32, boost: bool) -> Result<PulseSequence, Self::Error> {
        if pin != self.pin_id {
            return Err(CaptureError::PinUnavailable {
                requested: pin,
                bound: self.pin_id,
            });
        }

        if boost {
            self.boost.raise().map_err(|_| CaptureError::Boost)?;
        }
        let result = self.wake_and_sample();
        if boost {
            self.boost.restore();
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_capture;
    use crate::pulse::MAX_PULSES;
    use crate::pulse::fixtures::encode_payload;
    use crate::sensor::{Reading, SensorType};
    use embedded_hal_mock::eh1::delay::CheckedDelay;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::delay::Transaction as DelayTx;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTx,
    };

    const IDLE_US: u32 = 200;

    fn timing() -> CaptureTiming {
        CaptureTiming::default().with_idle_timeout(MicrosDurationU32::from_ticks(IDLE_US))
    }

    fn start_sequence() -> Vec<PinTx> {
        vec![
            PinTx::set(PinState::High),
            PinTx::set(PinState::Low),
            PinTx::set(PinState::High),
        ]
    }

    fn state(level: Level) -> PinState {
        match level {
            Level::Low => PinState::Low,
            Level::High => PinState::High,
        }
    }

    // One read per microsecond of every pulse, plus the idle tail.
    fn line(pulses: &[Pulse]) -> Vec<PinTx> {
        line_sampled_every(pulses, 1)
    }

    fn line_sampled_every(pulses: &[Pulse], step_us: u32) -> Vec<PinTx> {
        let (last, body) = pulses.split_last().unwrap();
        let mut reads: Vec<PinTx> = body
            .iter()
            .flat_map(|p| {
                std::iter::repeat_n(PinTx::get(state(p.level)), (p.duration.ticks() / step_us) as usize)
            })
            .collect();
        reads.extend(std::iter::repeat_n(
            PinTx::get(state(last.level)),
            (IDLE_US / step_us) as usize + 1,
        ));
        reads
    }

    fn sensor_response(data: [u8; 4]) -> Vec<Pulse> {
        let mut pulses = vec![Pulse::high(30), Pulse::low(80), Pulse::high(80)];
        pulses.extend(encode_payload(data));
        pulses.push(Pulse::low(50));
        pulses.push(Pulse::high(IDLE_US));
        pulses
    }

    struct CountingBoost {
        raised: u32,
        restored: u32,
        fail: bool,
    }

    impl SchedulerBoost for CountingBoost {
        fn raise(&mut self) -> Result<(), BoostError> {
            if self.fail {
                return Err(BoostError);
            }
            self.raised += 1;
            Ok(())
        }

        fn restore(&mut self) {
            self.restored += 1;
        }
    }

    #[test]
    fn test_pulses_from_raw() {
        let raw = [1, 30, 0, 80, 1, 80, 0, 50, 1, 70];
        let pulses = pulses_from_raw::<()>(&raw).unwrap();

        assert_eq!(
            pulses.as_slice(),
            &[
                Pulse::high(30),
                Pulse::low(80),
                Pulse::high(80),
                Pulse::low(50),
                Pulse::high(70),
            ]
        );
    }

    #[test]
    fn test_pulses_from_raw_rejects_malformed() {
        assert_eq!(
            pulses_from_raw::<()>(&[1, 30, 0]),
            Err(CaptureError::MalformedBuffer { len: 3 })
        );
        assert_eq!(
            pulses_from_raw::<()>(&[1, -30]),
            Err(CaptureError::MalformedBuffer { len: 2 })
        );
    }

    #[test]
    fn test_pulses_from_raw_counts_long_buffers() {
        let raw: Vec<i32> = (0..100).flat_map(|i| [i % 2, 50]).collect();
        let pulses = pulses_from_raw::<()>(&raw).unwrap();

        assert_eq!(pulses.len(), 100);
        assert_eq!(pulses.as_slice().len(), MAX_PULSES);
        assert!(pulses.is_truncated());
    }

    #[test]
    fn test_start_sequence() {
        let mut pin = PinMock::new(&start_sequence());

        let delay_transactions = vec![DelayTx::delay_ms(500), DelayTx::delay_ms(18)];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut capture = HalCapture::new(4, pin.clone(), &mut delay);
        capture.start().unwrap();

        pin.done();
        delay.done();
    }

    #[test]
    fn test_sample_records_edges() {
        let pulses = [Pulse::low(3), Pulse::high(2), Pulse::low(1), Pulse::high(IDLE_US)];
        let mut pin = PinMock::new(&line(&pulses));

        let mut capture = HalCapture::new(4, pin.clone(), NoopDelay).with_timing(timing());
        let captured = capture.sample().unwrap();

        assert_eq!(captured.as_slice(), &pulses);
        pin.done();
    }

    #[test]
    fn test_sample_step_scales_durations() {
        let pulses = [Pulse::low(6), Pulse::high(4), Pulse::low(2), Pulse::high(IDLE_US)];
        let reads = line_sampled_every(&pulses, 2);
        let mut pin = PinMock::new(&reads);

        let delays: Vec<DelayTx> = (1..reads.len()).map(|_| DelayTx::delay_us(2)).collect();
        let mut delay = CheckedDelay::new(&delays);

        let timing = timing().with_sample_step(MicrosDurationU32::from_ticks(2));
        let mut capture = HalCapture::new(4, pin.clone(), &mut delay).with_timing(timing);
        let captured = capture.sample().unwrap();

        assert_eq!(captured.as_slice(), &pulses);
        pin.done();
        delay.done();
    }

    #[test]
    fn test_capture_full_frame() {
        let response = sensor_response([0x01, 0x90, 0x01, 0x10]);
        let mut expect = start_sequence();
        expect.extend(line(&response));
        let mut pin = PinMock::new(&expect);

        let mut capture = HalCapture::new(4, pin.clone(), NoopDelay).with_timing(timing());
        let captured = capture.capture(4, false).unwrap();

        assert_eq!(captured.len(), 85);
        assert_eq!(captured.as_slice(), response.as_slice());
        assert_eq!(
            decode_capture(SensorType::Dht22, &captured),
            Ok(Reading {
                temperature: 27.2,
                relative_humidity: 40.0,
            })
        );

        pin.done();
    }

    #[test]
    fn test_capture_no_response() {
        let mut expect = start_sequence();
        expect.extend(line(&[Pulse::high(IDLE_US)]));
        let mut pin = PinMock::new(&expect);

        let mut capture = HalCapture::new(4, pin.clone(), NoopDelay).with_timing(timing());
        assert_eq!(capture.capture(4, false), Err(CaptureError::NoResponse));

        pin.done();
    }

    #[test]
    fn test_capture_keeps_counting_past_pulse_capacity() {
        let mut response: Vec<Pulse> = (0..MAX_PULSES).map(|i| Pulse::new(Level::from(i % 2 == 0), 3)).collect();
        response.push(Pulse::high(IDLE_US));
        response.push(Pulse::low(IDLE_US));
        let mut expect = start_sequence();
        expect.extend(line(&response));
        let mut pin = PinMock::new(&expect);

        let mut capture = HalCapture::new(4, pin.clone(), NoopDelay).with_timing(timing());
        let captured = capture.capture(4, false).unwrap();

        assert_eq!(captured.len(), MAX_PULSES + 2);
        assert!(captured.is_truncated());
        assert_eq!(captured.as_slice(), &response[..MAX_PULSES]);

        pin.done();
    }

    #[test]
    fn test_capture_overflow() {
        let mut expect = start_sequence();
        // MAX_EDGES + 1 edges need MAX_EDGES + 2 samples.
        expect.extend((0..MAX_EDGES + 2).map(|i| {
            PinTx::get(if i % 2 == 0 {
                PinState::Low
            } else {
                PinState::High
            })
        }));
        let mut pin = PinMock::new(&expect);

        let mut capture = HalCapture::new(4, pin.clone(), NoopDelay).with_timing(timing());
        assert_eq!(
            capture.capture(4, false),
            Err(CaptureError::Overflow {
                capacity: MAX_EDGES
            })
        );

        pin.done();
    }

    #[test]
    fn test_capture_wrong_pin() {
        let mut pin = PinMock::new(&[]);

        let mut capture = HalCapture::new(4, pin.clone(), NoopDelay);
        assert_eq!(
            capture.capture(17, false),
            Err(CaptureError::PinUnavailable {
                requested: 17,
                bound: 4
            })
        );

        pin.done();
    }

    #[test]
    fn test_capture_boost_wraps_sampling() {
        let mut expect = start_sequence();
        expect.extend(line(&sensor_response([45, 0, 26, 0])));
        let mut pin = PinMock::new(&expect);

        let boost = CountingBoost {
            raised: 0,
            restored: 0,
            fail: false,
        };
        let mut capture = HalCapture::new(4, pin.clone(), NoopDelay)
            .with_timing(timing())
            .with_boost(boost);
        assert!(capture.capture(4, true).is_ok());

        let (_, _, boost) = capture.release();
        assert_eq!((boost.raised, boost.restored), (1, 1));
        pin.done();
    }

    #[test]
    fn test_capture_boost_failure() {
        let mut pin = PinMock::new(&[]);

        let boost = CountingBoost {
            raised: 0,
            restored: 0,
            fail: true,
        };
        let mut capture = HalCapture::new(4, pin.clone(), NoopDelay).with_boost(boost);
        assert_eq!(capture.capture(4, true), Err(CaptureError::Boost));

        let (_, _, boost) = capture.release();
        assert_eq!(boost.restored, 0);
        pin.done();
    }
}
