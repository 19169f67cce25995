use core::fmt;
use core::str::FromStr;

use thiserror_no_std::Error;

/// Supported members of the DHTxx family.
///
/// The type decides how the four data bytes of a frame map to physical units.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SensorType {
    /// Integer-resolution sensor. Bytes 1 and 3 are sent but carry nothing.
    Dht11,
    /// 0.1 resolution sensor with a sign bit on the temperature.
    Dht22,
}

impl SensorType {
    /// The AM2302 is a DHT22 in a different package.
    pub const AM2302: SensorType = SensorType::Dht22;

    /// Converts the four data bytes of a validated frame into a [`Reading`].
    pub fn convert(self, data: [u8; 4]) -> Reading {
        match self {
            SensorType::Dht11 => {
                let [hum_int, _hum_dec, temp_int, _temp_dec] = data;
                Reading {
                    temperature: f32::from(temp_int),
                    relative_humidity: f32::from(hum_int),
                }
            }
            SensorType::Dht22 => {
                let [hum_hi, hum_lo, temp_hi, temp_lo] = data;

                let joined_humidity = u16::from_be_bytes([hum_hi, hum_lo]);
                let relative_humidity = joined_humidity as f32 / 10.0;

                let is_temp_negative = (temp_hi >> 7) != 0;
                let temp_hi = temp_hi & 0b0111_1111;
                let joined_temp = u16::from_be_bytes([temp_hi, temp_lo]);
                let mut temperature = joined_temp as f32 / 10.0;
                if is_temp_negative {
                    temperature = -temperature;
                }

                Reading {
                    temperature,
                    relative_humidity,
                }
            }
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorType::Dht11 => f.write_str("DHT11"),
            SensorType::Dht22 => f.write_str("DHT22"),
        }
    }
}

/// Returned when a sensor name is not one of `dht11`, `dht22` or `am2302`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("unknown sensor type, expected dht11, dht22 or am2302")]
pub struct UnknownSensorType;

impl FromStr for SensorType {
    type Err = UnknownSensorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("dht11") {
            Ok(SensorType::Dht11)
        } else if s.eq_ignore_ascii_case("dht22") || s.eq_ignore_ascii_case("am2302") {
            Ok(SensorType::Dht22)
        } else {
            Err(UnknownSensorType)
        }
    }
}

/// Reading returned by a DHTxx sensor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub relative_humidity: f32,
}

impl Reading {
    /// Temperature in degrees Fahrenheit.
    pub fn temperature_fahrenheit(&self) -> f32 {
        self.temperature * 1.8 + 32.0
    }
}
