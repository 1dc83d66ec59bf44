//! Time types for the coarse tick and the exact-wait timer

use core::fmt;

/// Coarse tick period in microseconds
pub const TICK_PERIOD_US: u32 = 1_000;

/// Countdown counter decremented once per coarse tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Countdown(u32);

impl Countdown {
    /// Elapsed counter
    pub const ZERO: Self = Self(0);

    /// Create a countdown of `ticks`
    pub const fn new(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Get the remaining tick count
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// Check if the countdown has elapsed
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Decrement by one tick, never below zero.
    ///
    /// Returns true only on the tick that reaches zero.
    pub fn decrement(&mut self) -> bool {
        if self.0 > 0 {
            self.0 -= 1;
            self.0 == 0
        } else {
            false
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ticks", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Countdown {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}ticks", self.0);
    }
}

/// Duration in coarse ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticks(u32);

impl Ticks {
    pub const ZERO: Self = Self(0);

    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Create from milliseconds (1 ms tick period)
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Create from seconds, saturating
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    /// Create from minutes, saturating
    pub const fn from_minutes(minutes: u32) -> Self {
        Self(minutes.saturating_mul(60_000))
    }

    pub const fn ticks(self) -> u32 {
        self.0
    }
}

impl From<Ticks> for Countdown {
    fn from(t: Ticks) -> Self {
        Countdown::new(t.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Ticks {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}ms", self.0);
    }
}

/// Exact-wait duration in whole microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Micros(u32);

impl Micros {
    pub const fn new(us: u32) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: u32) -> Self {
        Self(ms.saturating_mul(1_000))
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Convert to hardware timer ticks at `hz`, rounding up.
    ///
    /// The programmed wait is never shorter than requested.
    pub const fn to_timer_ticks(self, hz: u32) -> u64 {
        let num = self.0 as u64 * hz as u64;
        num.div_ceil(1_000_000)
    }

    /// Duration actually waited when programmed at `hz`, rounded up to whole microseconds.
    pub const fn programmed_at(self, hz: u32) -> Micros {
        if hz == 0 {
            return self;
        }
        let ticks = self.to_timer_ticks(hz);
        let us = (ticks * 1_000_000).div_ceil(hz as u64);
        Micros(if us > u32::MAX as u64 { u32::MAX } else { us as u32 })
    }
}

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Micros {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}us", self.0);
    }
}
