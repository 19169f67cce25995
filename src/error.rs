use core::fmt::Debug;

use fugit::MicrosDurationU32;
use thiserror_no_std::Error;

use crate::pulse::{Level, PulseSequence};

/// Reasons a pulse sequence could not be turned into a reading.
///
/// Every variant means the whole frame was rejected; the decoder never
/// returns partial results.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum DecodeError {
    /// Fewer than 16 pulses remain after `start`.
    #[error("cannot decode byte at index {start}: only {len} pulses available")]
    InsufficientPulses { start: usize, len: usize },
    /// A pulse had the wrong level for its position in a bit pair.
    #[error("{expected:?} edge expected at index {index}")]
    MalformedEdge { index: usize, expected: Level },
    /// A high pulse was too long to be a data bit.
    #[error(
        "high edge at index {index} lasted {}us, maximum is {}us",
        .duration.ticks(),
        .max.ticks()
    )]
    TimingOutOfRange {
        index: usize,
        duration: MicrosDurationU32,
        max: MicrosDurationU32,
    },
    /// The capture did not hold 82 to 85 pulses.
    ///
    /// `len` is the number of pulses the capture produced. `pulses` keeps the
    /// raw capture (its first [`MAX_PULSES`](crate::MAX_PULSES) pulses) for
    /// wiring diagnostics.
    #[error("incorrect pulse count {len}, expected 82 to 85")]
    InvalidFrameLength { len: usize, pulses: PulseSequence },
    /// The checksum byte disagrees with the sum of the data bytes.
    #[error("checksum from sensor ({received}) != calculated checksum ({computed})")]
    ChecksumMismatch { received: u8, computed: u8 },
    /// Checksum matched but the humidity is physically impossible.
    #[error("humidity value exceeds 100%: {0}")]
    HumidityOutOfRange(f32),
}

#[cfg(feature = "defmt")]
impl defmt::Format for DecodeError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::InsufficientPulses { start, len } => {
                defmt::write!(fmt, "InsufficientPulses at {} of {}", start, len)
            }
            Self::MalformedEdge { index, expected } => {
                defmt::write!(fmt, "{} edge expected at {}", expected, index)
            }
            Self::TimingOutOfRange { index, duration, .. } => {
                defmt::write!(fmt, "high edge at {} lasted {}us", index, duration.ticks())
            }
            Self::InvalidFrameLength { len, pulses } => {
                defmt::write!(fmt, "{} pulses: {}", len, pulses.as_slice())
            }
            Self::ChecksumMismatch { received, computed } => {
                defmt::write!(fmt, "checksum {} != {}", received, computed)
            }
            Self::HumidityOutOfRange(humidity) => {
                defmt::write!(fmt, "humidity {} > 100%", humidity)
            }
        }
    }
}

/// Failures of the embedded-hal capture adapter and raw buffer conversion.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CaptureError<E: Debug> {
    /// Error from the GPIO pin (input/output).
    #[error("pin error: {0:?}")]
    PinError(E),
    /// The adapter is bound to a different pin.
    #[error("pin {requested} requested but adapter is bound to pin {bound}")]
    PinUnavailable { requested: u32, bound: u32 },
    /// The line never changed level after the start signal.
    #[error("no response from sensor")]
    NoResponse,
    /// The line kept toggling past the adapter's edge limit.
    #[error("pulse count exceeds limit of {capacity}")]
    Overflow { capacity: usize },
    /// A raw `[level, duration, ...]` buffer had an odd length or a negative duration.
    #[error("malformed raw pulse buffer of length {len}")]
    MalformedBuffer { len: usize },
    /// Elevated scheduling was requested but could not be obtained.
    #[error("unable to raise scheduling priority")]
    Boost,
}

#[cfg(feature = "defmt")]
impl<E: Debug + defmt::Format> defmt::Format for CaptureError<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::PinError(e) => defmt::write!(fmt, "PinError({})", e),
            Self::PinUnavailable { requested, bound } => {
                defmt::write!(fmt, "pin {} requested, bound to {}", requested, bound)
            }
            Self::NoResponse => defmt::write!(fmt, "NoResponse"),
            Self::Overflow { capacity } => defmt::write!(fmt, "Overflow past {}", capacity),
            Self::MalformedBuffer { len } => defmt::write!(fmt, "MalformedBuffer of {}", len),
            Self::Boost => defmt::write!(fmt, "Boost"),
        }
    }
}

impl<E: Debug> From<E> for CaptureError<E> {
    fn from(value: E) -> Self {
        Self::PinError(value)
    }
}

/// Pipeline stage a single-read failure originated from.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Decode,
}

/// Failure of one capture-and-decode attempt.
#[derive(Error, Debug, PartialEq)]
pub enum AcquisitionError<E: Debug> {
    /// The capture adapter failed.
    #[error("capture failed: {0:?}")]
    Capture(E),
    /// The captured pulses did not decode.
    #[error("decode failed: {0}")]
    Decode(DecodeError),
}

impl<E: Debug> AcquisitionError<E> {
    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Capture(_) => Stage::Capture,
            Self::Decode(_) => Stage::Decode,
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: Debug + defmt::Format> defmt::Format for AcquisitionError<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Capture(e) => defmt::write!(fmt, "capture failed: {}", e),
            Self::Decode(e) => defmt::write!(fmt, "decode failed: {}", e),
        }
    }
}

impl<E: Debug> From<DecodeError> for AcquisitionError<E> {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Terminal failures of the retrying reader.
#[derive(Error, Debug, PartialEq)]
pub enum RetryError<E: Debug> {
    /// Cancellation was observed before a reading was obtained.
    #[error("termination pending after {retries_used} retries")]
    Terminated { retries_used: u32 },
    /// The retry budget ran out; `last` is the failure of the final attempt.
    #[error("giving up after {retries_used} retries: {last:?}")]
    RetriesExhausted {
        retries_used: u32,
        last: AcquisitionError<E>,
    },
}

impl<E: Debug> RetryError<E> {
    /// Number of retries consumed before the loop stopped.
    pub fn retries_used(&self) -> u32 {
        match self {
            Self::Terminated { retries_used } | Self::RetriesExhausted { retries_used, .. } => {
                *retries_used
            }
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: Debug + defmt::Format> defmt::Format for RetryError<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Terminated { retries_used } => {
                defmt::write!(fmt, "terminated after {} retries", retries_used)
            }
            Self::RetriesExhausted { retries_used, last } => {
                defmt::write!(fmt, "giving up after {} retries: {}", retries_used, last)
            }
        }
    }
}
