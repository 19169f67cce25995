use embedded_hal::delay::DelayNs;
use fugit::MillisDurationU32;

use crate::cancel::Cancel;
use crate::capture::PulseCapture;
use crate::decode::decode_capture;
use crate::error::{AcquisitionError, RetryError};
use crate::pulse::Level;
use crate::sensor::{Reading, SensorType};

/// Wait between two attempts. DHTxx sensors need about a second and a half
/// between measurements.
pub const DEFAULT_RETRY_DELAY: MillisDurationU32 = MillisDurationU32::from_ticks(1500);

/// Reader configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Pause after a failed attempt before the next one.
    pub retry_delay: MillisDurationU32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl Config {
    /// Sets the pause between attempts.
    pub fn with_retry_delay(mut self, retry_delay: MillisDurationU32) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// Reader for DHTxx sensors.
///
/// Owns a [`PulseCapture`] for talking to the hardware and a delay provider
/// used for the pause between attempts. One reader drives one capture at a
/// time; readers for different pins are independent.
pub struct Dht<C, D> {
    capture: C,
    delay: D,
    config: Config,
}

impl<C, D> Dht<C, D>
where
    C: PulseCapture,
    D: DelayNs,
{
    /// Creates a new reader with the default [`Config`].
    ///
    /// # Arguments
    ///
    /// * `capture` - The pulse capture adapter for the sensor's data line.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    pub fn new(capture: C, delay: D) -> Self {
        Self::with_config(capture, delay, Config::default())
    }

    /// Creates a new reader with the given [`Config`].
    pub fn with_config(capture: C, delay: D, config: Config) -> Self {
        Dht {
            capture,
            delay,
            config,
        }
    }

    /// The configuration this reader was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Releases the capture adapter and the delay provider.
    pub fn release(self) -> (C, D) {
        (self.capture, self.delay)
    }

    /// Performs a single capture and decodes it.
    ///
    /// # Returns
    ///
    /// * `Ok(Reading)` if the capture succeeded and the frame validated.
    /// * `Err(AcquisitionError)` tagged with the failing stage otherwise.
    pub fn read_once(
        &mut self,
        sensor_type: SensorType,
        pin: u32,
        boost: bool,
    ) -> Result<Reading, AcquisitionError<C::Error>> {
        let pulses = self
            .capture
            .capture(pin, boost)
            .map_err(AcquisitionError::Capture)?;
        debug!("{} pulses received from sensor on pin {}", pulses.len(), pin);
        for (i, pulse) in pulses.iter().enumerate() {
            trace!("pulse {}: {}us {}", i, pulse.duration.ticks(), pulse.level == Level::High);
        }

        Ok(decode_capture(sensor_type, &pulses)?)
    }

    /// Reads the sensor, retrying failed attempts up to `max_retries` times.
    ///
    /// `cancel` is checked before every attempt and while waiting out the
    /// retry delay; a capture already in progress is never interrupted.
    ///
    /// # Returns
    ///
    /// * `Ok((Reading, retries_used))` from the first attempt that succeeds.
    /// * `Err(RetryError::Terminated)` once cancellation is observed, even
    ///   with retries left.
    /// * `Err(RetryError::RetriesExhausted)` with the last failure after
    ///   `max_retries + 1` failed attempts.
    pub fn read_with_retry<S: Cancel>(
        &mut self,
        sensor_type: SensorType,
        pin: u32,
        boost: bool,
        max_retries: u32,
        cancel: S,
    ) -> Result<(Reading, u32), RetryError<C::Error>> {
        let mut attempts_remaining = max_retries;
        let mut retries_used = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Terminated { retries_used });
            }

            let err = match self.read_once(sensor_type, pin, boost) {
                Ok(reading) => return Ok((reading, retries_used)),
                Err(err) => err,
            };

            if attempts_remaining == 0 {
                return Err(RetryError::RetriesExhausted {
                    retries_used,
                    last: err,
                });
            }

            warn!(
                "{} read on pin {} failed at {:?} stage, {} retries left",
                sensor_type,
                pin,
                err.stage(),
                attempts_remaining
            );
            attempts_remaining -= 1;
            retries_used += 1;

            if cancel.wait(&mut self.delay, self.config.retry_delay) {
                return Err(RetryError::Terminated { retries_used });
            }
        }
    }
}
