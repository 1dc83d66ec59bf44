//! Latest sensor readings, assembled into the next log record

use bitflags::bitflags;
use fermon_sensors::BubbleReading;
use fermon_store::LogRecord;

bitflags! {
    /// Sources updated since the last store attempt
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Fresh: u8 {
        const TEMPERATURE = 0x01;
        const BUBBLE = 0x02;
        const WEIGHT = 0x04;
        const ETHANOL = 0x08;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Fresh {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Fresh({=u8:#x})", self.bits());
    }
}

/// Newest value from every sensor
///
/// A sensor that stops reporting keeps its last value; `fresh` tells which
/// fields moved since the last store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latest {
    record: LogRecord,
    fresh: Fresh,
    bubble_raw: u16,
    threshold: Option<u16>,
}

impl Latest {
    pub const fn new() -> Self {
        Self {
            record: LogRecord::empty(),
            fresh: Fresh::empty(),
            bubble_raw: 0,
            threshold: None,
        }
    }

    pub fn set_temperature(&mut self, raw: u16) {
        self.record.temperature = raw;
        self.fresh |= Fresh::TEMPERATURE;
    }

    pub fn set_weight(&mut self, weight: i32) {
        self.record.weight = weight;
        self.fresh |= Fresh::WEIGHT;
    }

    pub fn set_ethanol(&mut self, level: u16) {
        self.record.ethanol = level;
        self.fresh |= Fresh::ETHANOL;
    }

    /// Bubble counters plus the sample and threshold they were taken with
    pub fn set_bubble(&mut self, reading: BubbleReading, raw: u16, threshold: u16) {
        self.record.bubble = reading.integral;
        self.record.co2 = reading.co2;
        self.bubble_raw = raw;
        self.threshold = Some(threshold);
        self.fresh |= Fresh::BUBBLE;
    }

    /// Record to store next; its sequence number is stamped by the store
    pub fn record(&self) -> LogRecord {
        self.record
    }

    pub fn fresh(&self) -> Fresh {
        self.fresh
    }

    pub fn clear_fresh(&mut self) {
        self.fresh = Fresh::empty();
    }

    /// Last raw bubble sensor sample
    pub fn bubble_raw(&self) -> u16 {
        self.bubble_raw
    }

    /// Bubble threshold in ADC units, once the bubble task has reported
    pub fn threshold(&self) -> Option<u16> {
        self.threshold
    }
}
