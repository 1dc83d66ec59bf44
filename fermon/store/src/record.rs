//! Log record codec
//!
//! 16 bytes, little-endian, sequence number last:
//!
//! | offset | size | field       |
//! |--------|------|-------------|
//! | 0      | 4    | weight      |
//! | 4      | 2    | temperature |
//! | 6      | 2    | ethanol     |
//! | 8      | 4    | bubble      |
//! | 12     | 2    | co2         |
//! | 14     | 1    | reserved    |
//! | 15     | 1    | n           |
//!
//! `n` is the last byte programmed, so a write cut short leaves the slot's
//! previous sequence number in place and the slot is reused after reboot.

/// Encoded record size in bytes
pub const RECORD_SIZE: usize = 16;

/// Offset of the sequence byte inside a record
pub const SEQ_OFFSET: usize = RECORD_SIZE - 1;

/// Sequence number of a slot that was never written (erased NVM)
pub const SEQ_UNWRITTEN: u8 = 0xFF;

/// Sequence numbers cycle through `0..SEQ_DOMAIN`; 254 is never used
pub const SEQ_DOMAIN: u8 = 254;

/// Sequence number following `n`
pub const fn next_seq(n: u8) -> u8 {
    ((n as u16 + 1) % SEQ_DOMAIN as u16) as u8
}

/// One sampling epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogRecord {
    /// Load cell sum of samples, signed
    pub weight: i32,
    /// DS18B20 raw, 12.4 fixed point
    pub temperature: u16,
    /// MQ-3 ADC reading
    pub ethanol: u16,
    /// Bubble integral
    pub bubble: u32,
    /// CO2 hall sensor edge count
    pub co2: u16,
    pub reserved: u8,
    /// Sequence number, stamped by the store
    pub n: u8,
}

impl LogRecord {
    pub const fn empty() -> Self {
        Self {
            weight: 0,
            temperature: 0,
            ethanol: 0,
            bubble: 0,
            co2: 0,
            reserved: 0,
            n: SEQ_UNWRITTEN,
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut b = [0u8; RECORD_SIZE];
        b[0..4].copy_from_slice(&self.weight.to_le_bytes());
        b[4..6].copy_from_slice(&self.temperature.to_le_bytes());
        b[6..8].copy_from_slice(&self.ethanol.to_le_bytes());
        b[8..12].copy_from_slice(&self.bubble.to_le_bytes());
        b[12..14].copy_from_slice(&self.co2.to_le_bytes());
        b[14] = self.reserved;
        b[SEQ_OFFSET] = self.n;
        b
    }

    pub fn from_bytes(b: &[u8; RECORD_SIZE]) -> Self {
        Self {
            weight: i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            temperature: u16::from_le_bytes([b[4], b[5]]),
            ethanol: u16::from_le_bytes([b[6], b[7]]),
            bubble: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            co2: u16::from_le_bytes([b[12], b[13]]),
            reserved: b[14],
            n: b[SEQ_OFFSET],
        }
    }

    /// The slot holding this record has been written at least once
    pub fn is_written(&self) -> bool {
        self.n != SEQ_UNWRITTEN
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LogRecord {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "LogRecord{{n: {}, w: {}, t: {}, eth: {}, bub: {}, co2: {}}}",
            self.n,
            self.weight,
            self.temperature,
            self.ethanol,
            self.bubble,
            self.co2
        );
    }
}
