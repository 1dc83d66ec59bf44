//! Coarse timer pool
//!
//! A fixed set of countdown counters decremented by the 1 ms tick. Handles
//! are handed out in acquisition order and never returned.

use fermon_core::{fm_warn, Countdown, FmError, FmResult};

/// Number of coarse timers
pub const COARSE_TIMERS: usize = 7;

/// Handle to an allocated coarse timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u8);

impl TimerHandle {
    /// Slot index in the pool
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TimerHandle {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "timer#{}", self.0);
    }
}

/// Fixed-capacity pool of coarse countdown timers
pub struct CoarseTimerPool<const N: usize = COARSE_TIMERS> {
    counters: [Countdown; N],
    allocated: usize,
}

impl<const N: usize> CoarseTimerPool<N> {
    pub const fn new() -> Self {
        Self {
            counters: [Countdown::ZERO; N],
            allocated: 0,
        }
    }

    /// Allocate the next free timer, initially elapsed.
    pub fn acquire(&mut self) -> FmResult<TimerHandle> {
        if self.allocated >= N || self.allocated > u8::MAX as usize {
            fm_warn!("coarse timer pool exhausted");
            return Err(FmError::ResourceExhausted);
        }
        let handle = TimerHandle(self.allocated as u8);
        self.allocated += 1;
        Ok(handle)
    }

    /// Load `ticks` into the timer.
    pub fn set(&mut self, handle: TimerHandle, ticks: u32) -> FmResult<()> {
        let counter = self.slot_mut(handle)?;
        *counter = Countdown::new(ticks);
        Ok(())
    }

    /// Ticks left before the timer elapses.
    pub fn remaining(&self, handle: TimerHandle) -> FmResult<u32> {
        self.slot(handle).map(|c| c.ticks())
    }

    /// Level check: true for as long as the timer sits at zero.
    pub fn elapsed(&self, handle: TimerHandle) -> FmResult<bool> {
        self.slot(handle).map(|c| c.is_zero())
    }

    /// Decrement every allocated, non-zero timer by one tick.
    ///
    /// Runs from the tick interrupt; the loop bound is the pool size.
    pub fn tick(&mut self) {
        for counter in self.counters[..self.allocated].iter_mut() {
            counter.decrement();
        }
    }

    /// Number of timers handed out
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn slot(&self, handle: TimerHandle) -> FmResult<&Countdown> {
        if handle.index() >= self.allocated {
            return Err(FmError::OutOfRange);
        }
        Ok(&self.counters[handle.index()])
    }

    fn slot_mut(&mut self, handle: TimerHandle) -> FmResult<&mut Countdown> {
        if handle.index() >= self.allocated {
            return Err(FmError::OutOfRange);
        }
        Ok(&mut self.counters[handle.index()])
    }
}

impl<const N: usize> Default for CoarseTimerPool<N> {
    fn default() -> Self {
        Self::new()
    }
}
