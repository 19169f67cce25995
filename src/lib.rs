//! DHT11 / DHT22 Sensor Reader for Embedded Rust
//!
//! This crate reads the DHTxx family of temperature and humidity sensors
//! (DHT11, DHT22 and its AM2302 variant) over their single-wire, timing-based
//! protocol, built on top of the [`embedded-hal`] traits.
//!
//! A read has three stages:
//! - a [`PulseCapture`] wakes the sensor and records the (level, duration)
//!   pulses it sends back,
//! - the decoder ([`decode_frame`]) turns 80 of those pulses into five bytes,
//!   verifies the checksum and converts the data for the [`SensorType`],
//! - [`Dht::read_with_retry`] repeats failed attempts with a pause between
//!   them and stops early when a [`Cancel`] signal fires.
//!
//! # Features
//! - Blocking synchronous API using `embedded-hal` traits
//! - Designed for `no_std` environments
//! - `std`: [`CancellationToken`] and [`StdDelay`] for hosted targets
//! - `defmt`: Implements `defmt::Format` and logs through `defmt`
//! - `log`: Logs through the `log` facade
//!
//! # Example
//!
//! ```ignore
//! use dhtxx_sensor::{Dht, HalCapture, SensorType};
//! use core::sync::atomic::AtomicBool;
//!
//! static STOP: AtomicBool = AtomicBool::new(false);
//!
//! let capture = HalCapture::new(4, pin, capture_delay);
//! let mut dht = Dht::new(capture, delay);
//! let (reading, retries) = dht.read_with_retry(SensorType::AM2302, 4, false, 10, &STOP)?;
//! ```
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal
//! [`CancellationToken`]: cancel::CancellationToken
//! [`StdDelay`]: host::StdDelay

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod cancel;
pub mod capture;
pub mod decode;
pub mod dht;
pub mod error;
#[cfg(feature = "std")]
pub mod host;
pub mod pulse;
pub mod sensor;

pub use cancel::{Cancel, Never};
pub use capture::{
    CaptureTiming, HalCapture, MAX_EDGES, NoBoost, PulseCapture, SchedulerBoost, pulses_from_raw,
};
pub use decode::{Frame, decode_byte, decode_capture, decode_frame, decode_raw, decode_raw_capture};
pub use dht::{Config, Dht};
pub use error::{AcquisitionError, CaptureError, DecodeError, RetryError, Stage};
pub use pulse::{Level, MAX_PULSES, Pulse, PulseSequence};
pub use sensor::{Reading, SensorType};
