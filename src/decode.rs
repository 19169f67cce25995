//! Pulse demodulation.
//!
//! After the acknowledgment pulses a DHTxx sensor sends 40 bits, each as a
//! ~50us low pulse followed by a high pulse of ~24us (bit 0) or ~70us (bit 1).
//! The bits form four data bytes and a checksum.

use fugit::MicrosDurationU32;

use crate::error::DecodeError;
use crate::pulse::{Level, Pulse, PulseSequence};
use crate::sensor::{Reading, SensorType};

/// Pulses carrying one byte: eight (low, high) pairs.
pub const PULSES_PER_BYTE: usize = 16;

/// Pulses carrying the whole frame: five bytes.
pub const FRAME_PULSES: usize = 5 * PULSES_PER_BYTE;

/// Longest high pulse accepted as a data bit.
///
/// Midway between the 70us "1" pulse and the 54us low pulse, on top of 70us.
pub const HIGH_DUR_MAX: MicrosDurationU32 = MicrosDurationU32::from_ticks(70 + (70 + 54) / 2);

/// Threshold between the nominal 24us "0" pulse and the 70us "1" pulse.
///
/// High pulses longer than this decode as 1, everything else as 0.
pub const HIGH_DUR_AVG: MicrosDurationU32 = MicrosDurationU32::from_ticks(24 + (70 - 24) / 2);

/// The five bytes of a frame whose checksum has been verified.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Humidity high/integer, humidity low/fraction, temperature high/integer,
    /// temperature low/fraction.
    pub data: [u8; 4],
    /// Checksum byte as sent by the sensor.
    pub checksum: u8,
}

impl Frame {
    /// Truncated 8-bit sum of the data bytes.
    pub fn computed_checksum(&self) -> u8 {
        checksum(self.data)
    }
}

fn checksum(data: [u8; 4]) -> u8 {
    data.iter().fold(0u8, |sum, v| sum.wrapping_add(*v))
}

/// Decodes one byte from the 16 pulses starting at `start`.
///
/// # Errors
///
/// * [`DecodeError::InsufficientPulses`] if fewer than 16 pulses remain
/// * [`DecodeError::MalformedEdge`] if a pair is not (low, high)
/// * [`DecodeError::TimingOutOfRange`] if a high pulse exceeds [`HIGH_DUR_MAX`]
pub fn decode_byte(pulses: &[Pulse], start: usize) -> Result<u8, DecodeError> {
    if pulses.len().saturating_sub(start) < PULSES_PER_BYTE {
        return Err(DecodeError::InsufficientPulses {
            start,
            len: pulses.len(),
        });
    }

    let mut byte: u8 = 0;

    for i in 0..8 {
        let low_index = start + i * 2;
        let high_index = low_index + 1;
        let low = pulses[low_index];
        let high = pulses[high_index];

        if low.level != Level::Low {
            return Err(DecodeError::MalformedEdge {
                index: low_index,
                expected: Level::Low,
            });
        }
        if high.level != Level::High {
            return Err(DecodeError::MalformedEdge {
                index: high_index,
                expected: Level::High,
            });
        }
        if high.duration > HIGH_DUR_MAX {
            return Err(DecodeError::TimingOutOfRange {
                index: high_index,
                duration: high.duration,
                max: HIGH_DUR_MAX,
            });
        }
        if high.duration > HIGH_DUR_AVG {
            byte |= 1 << (7 - i);
        }
    }

    Ok(byte)
}

/// Strips the 1 to 3 leading acknowledgment pulses and returns the 80 payload pulses.
///
/// `received` is the number of pulses the capture produced, which may exceed
/// `pulses.len()` when the capture was truncated.
fn trim_frame(pulses: &[Pulse], received: usize) -> Option<&[Pulse]> {
    if received != pulses.len() {
        return None;
    }
    let skip = match received {
        85 => 3,
        84 => 2,
        83 => 1,
        82 => 0,
        _ => return None,
    };

    Some(&pulses[skip..skip + FRAME_PULSES])
}

fn invalid_length(pulses: PulseSequence) -> DecodeError {
    trace!("pulses received from sensor: {}", pulses.len());
    for (i, pulse) in pulses.iter().enumerate() {
        trace!("pulse {}: {}us {}", i, pulse.duration.ticks(), pulse.level == Level::High);
    }
    DecodeError::InvalidFrameLength {
        len: pulses.len(),
        pulses,
    }
}

fn decode_payload(payload: &[Pulse]) -> Result<Frame, DecodeError> {
    let mut data = [0; 4];
    for (i, b) in data.iter_mut().enumerate() {
        *b = decode_byte(payload, i * PULSES_PER_BYTE)?;
    }
    let received = decode_byte(payload, 4 * PULSES_PER_BYTE)?;

    let frame = Frame {
        data,
        checksum: received,
    };
    let computed = frame.computed_checksum();
    if received != computed {
        return Err(DecodeError::ChecksumMismatch { received, computed });
    }

    debug!(
        "checksum verified: {} = {}+{}+{}+{}",
        received, data[0], data[1], data[2], data[3]
    );

    Ok(frame)
}

/// Decodes a capture into its verified five bytes.
///
/// # Errors
///
/// [`DecodeError::InvalidFrameLength`] for captures outside 82 to 85 pulses,
/// any [`decode_byte`] error unchanged, and [`DecodeError::ChecksumMismatch`].
pub fn decode_raw(pulses: &[Pulse]) -> Result<Frame, DecodeError> {
    match trim_frame(pulses, pulses.len()) {
        Some(payload) => decode_payload(payload),
        None => Err(invalid_length(pulses.iter().copied().collect())),
    }
}

/// Like [`decode_raw`], but takes the length from `capture` so a truncated
/// capture is reported with the number of pulses the sensor actually sent.
pub fn decode_raw_capture(capture: &PulseSequence) -> Result<Frame, DecodeError> {
    match trim_frame(capture.as_slice(), capture.len()) {
        Some(payload) => decode_payload(payload),
        None => Err(invalid_length(capture.clone())),
    }
}

fn to_reading(sensor_type: SensorType, frame: Frame) -> Result<Reading, DecodeError> {
    let reading = sensor_type.convert(frame.data);

    if reading.relative_humidity > 100.0 {
        return Err(DecodeError::HumidityOutOfRange(reading.relative_humidity));
    }

    Ok(reading)
}

/// Decodes a capture into a [`Reading`] using the formula of `sensor_type`.
///
/// # Errors
///
/// Everything [`decode_raw`] returns, plus [`DecodeError::HumidityOutOfRange`]
/// when the checksum matched but the humidity is above 100%.
pub fn decode_frame(sensor_type: SensorType, pulses: &[Pulse]) -> Result<Reading, DecodeError> {
    to_reading(sensor_type, decode_raw(pulses)?)
}

/// [`decode_frame`] for a [`PulseSequence`] straight from a [`PulseCapture`].
///
/// [`PulseCapture`]: crate::PulseCapture
pub fn decode_capture(sensor_type: SensorType, capture: &PulseSequence) -> Result<Reading, DecodeError> {
    to_reading(sensor_type, decode_raw_capture(capture)?)
}
