//! Persisted configuration record
//!
//! Four bytes at NVM offset 0: bubble threshold, store interval (minutes),
//! behavior flags, reserved. A threshold byte of 255 is erased NVM and means
//! the device was never configured.

use bitflags::bitflags;
use fermon_core::Ticks;

/// Encoded config size in bytes
pub const CONFIG_SIZE: usize = 4;

/// Threshold byte value of erased NVM
pub const UNCONFIGURED: u8 = 0xFF;

/// Threshold byte scale: stored value n means an ADC level of n × 32
pub const THRESHOLD_SHIFT: u32 = 5;

bitflags! {
    /// Behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigFlags: u8 {
        /// Echo each detected bubble on the serial link
        const ECHO_BUBBLE = 0x01;
        /// Echo the bubble integral
        const ECHO_BINTEGRAL = 0x02;
        /// Echo auto-level min/max limits
        const ECHO_BUBBLE_LIMITS = 0x04;
        /// Derive the bubble threshold from observed min/max
        const BUBBLE_AUTOLEVEL = 0x10;
        /// A bubble reads above the threshold instead of below
        const BUBBLE_INVERT = 0x20;
        /// Mirror radio traffic on the serial link
        const SEND_UART = 0x80;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigFlags {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ConfigFlags({=u8:#x})", self.bits());
    }
}

/// Bubble threshold as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Track the signal's min/max, starting from `around`; `None` keeps
    /// the sensor's current level
    Auto { around: Option<u16> },
    /// Fixed ADC level
    Level(u16),
}

/// Runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRecord {
    /// 0 = auto-level, otherwise level / 32
    pub bubble_level: u8,
    /// Minutes between stored records; 0 behaves as 1
    pub store_interval: u8,
    pub flags: ConfigFlags,
    pub reserved: u8,
}

impl ConfigRecord {
    pub const DEFAULT_BUBBLE_LEVEL: u8 = 34;
    pub const DEFAULT_STORE_INTERVAL: u8 = 60;

    pub fn to_bytes(&self) -> [u8; CONFIG_SIZE] {
        [self.bubble_level, self.store_interval, self.flags.bits(), self.reserved]
    }

    /// Decode, or `None` when the slot was never configured.
    pub fn from_bytes(b: &[u8; CONFIG_SIZE]) -> Option<Self> {
        if b[0] == UNCONFIGURED {
            return None;
        }
        Some(Self {
            bubble_level: b[0],
            store_interval: b[1],
            flags: ConfigFlags::from_bits_retain(b[2]),
            reserved: b[3],
        })
    }

    /// Store interval in coarse ticks
    pub fn store_interval_ticks(&self) -> Ticks {
        Ticks::from_minutes(self.store_interval.max(1) as u32)
    }

    /// Threshold the bubble sensor should start with
    pub fn threshold(&self) -> Threshold {
        let level = (self.bubble_level as u16) << THRESHOLD_SHIFT;
        if self.bubble_level == 0 {
            Threshold::Auto { around: None }
        } else if self.flags.contains(ConfigFlags::BUBBLE_AUTOLEVEL) {
            Threshold::Auto { around: Some(level) }
        } else {
            Threshold::Level(level)
        }
    }

    /// Record an ADC threshold, quantized to the stored byte.
    pub fn set_threshold_level(&mut self, level: u16) {
        let q = (level >> THRESHOLD_SHIFT).min(UNCONFIGURED as u16 - 1);
        self.bubble_level = q as u8;
    }
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            bubble_level: Self::DEFAULT_BUBBLE_LEVEL,
            store_interval: Self::DEFAULT_STORE_INTERVAL,
            flags: ConfigFlags::ECHO_BUBBLE | ConfigFlags::SEND_UART | ConfigFlags::BUBBLE_AUTOLEVEL,
            reserved: 0,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigRecord {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "Config{{level: {}, interval: {}min, flags: {}}}",
            self.bubble_level,
            self.store_interval,
            self.flags
        );
    }
}
