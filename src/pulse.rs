use fugit::MicrosDurationU32;

/// Number of pulses a [`PulseSequence`] keeps.
///
/// A healthy frame is 82 to 85 pulses long. Longer captures are still
/// counted in full, but only their first `MAX_PULSES` pulses are stored.
pub const MAX_PULSES: usize = 96;

/// Ordered pulses as captured from the data line.
///
/// Keeps the first [`MAX_PULSES`] pulses and counts every pulse pushed, so a
/// noisy capture reaches the decoder with its true length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PulseSequence {
    pulses: heapless::Vec<Pulse, MAX_PULSES>,
    received: usize,
}

impl PulseSequence {
    /// Creates an empty sequence.
    pub const fn new() -> Self {
        PulseSequence {
            pulses: heapless::Vec::new(),
            received: 0,
        }
    }

    /// Appends a pulse. Pulses past [`MAX_PULSES`] are counted, not stored.
    pub fn push(&mut self, pulse: Pulse) {
        self.received += 1;
        let _ = self.pulses.push(pulse);
    }

    /// Number of pulses pushed, stored or not.
    pub fn len(&self) -> usize {
        self.received
    }

    pub fn is_empty(&self) -> bool {
        self.received == 0
    }

    /// True when more pulses were pushed than could be stored.
    pub fn is_truncated(&self) -> bool {
        self.received > self.pulses.len()
    }

    /// The stored pulses.
    pub fn as_slice(&self) -> &[Pulse] {
        &self.pulses
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Pulse> {
        self.pulses.iter()
    }
}

impl FromIterator<Pulse> for PulseSequence {
    fn from_iter<I: IntoIterator<Item = Pulse>>(iter: I) -> Self {
        let mut sequence = PulseSequence::new();
        for pulse in iter {
            sequence.push(pulse);
        }
        sequence
    }
}

impl<'a> IntoIterator for &'a PulseSequence {
    type Item = &'a Pulse;
    type IntoIter = core::slice::Iter<'a, Pulse>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PulseSequence {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{} pulses {}", self.received, self.pulses.as_slice())
    }
}

/// Electrical level of the data line.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// A line level held for a measured duration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse {
    /// Level of the line during the pulse.
    pub level: Level,
    /// How long the level was held.
    pub duration: MicrosDurationU32,
}

impl Pulse {
    /// Creates a pulse from a level and a duration in microseconds.
    pub const fn new(level: Level, duration_us: u32) -> Self {
        Pulse {
            level,
            duration: MicrosDurationU32::from_ticks(duration_us),
        }
    }

    /// Shorthand for a low pulse.
    pub const fn low(duration_us: u32) -> Self {
        Self::new(Level::Low, duration_us)
    }

    /// Shorthand for a high pulse.
    pub const fn high(duration_us: u32) -> Self {
        Self::new(Level::High, duration_us)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Pulse {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}:{}us", self.level, self.duration.ticks())
    }
}
