//! Callback timer slots
//!
//! Up to five countdowns on the fast tick, each bound to a callback that fires
//! inside the interrupt when it reaches zero. A slot fires once and stays
//! inert until rearmed.

use fermon_core::{fm_warn, Countdown, FmError, FmResult};

/// Number of callback slots
pub const CALLBACK_TIMERS: usize = 5;

/// Work run from the fast tick interrupt
///
/// The implementor carries its own context; `fire` must return promptly.
pub trait TimerCallback: Sync {
    fn fire(&self);
}

/// Adapter for a plain function pointer
pub struct FnCallback(pub fn());

impl TimerCallback for FnCallback {
    fn fire(&self) {
        (self.0)()
    }
}

/// Handle to an attached callback slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle(u8);

impl CallbackHandle {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy)]
struct Slot {
    countdown: Countdown,
    callback: &'static dyn TimerCallback,
}

/// Bounded set of (countdown, callback) pairs
pub struct CallbackTimers<const N: usize = CALLBACK_TIMERS> {
    slots: [Option<Slot>; N],
}

impl<const N: usize> CallbackTimers<N> {
    pub const fn new() -> Self {
        Self { slots: [None; N] }
    }

    /// Bind `callback` to a free slot, disarmed.
    pub fn attach(&mut self, callback: &'static dyn TimerCallback) -> FmResult<CallbackHandle> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.is_none())
            .ok_or_else(|| {
                fm_warn!("callback slots exhausted");
                FmError::ResourceExhausted
            })?;
        *slot = Some(Slot {
            countdown: Countdown::ZERO,
            callback,
        });
        Ok(CallbackHandle(index as u8))
    }

    /// Fire the callback after `ticks` fast ticks.
    pub fn arm(&mut self, handle: CallbackHandle, ticks: u32) -> FmResult<()> {
        let slot = self
            .slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or(FmError::OutOfRange)?;
        slot.countdown = Countdown::new(ticks);
        Ok(())
    }

    pub fn remaining(&self, handle: CallbackHandle) -> FmResult<u32> {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .map(|s| s.countdown.ticks())
            .ok_or(FmError::OutOfRange)
    }

    /// Advance every armed slot; returns how many callbacks fired.
    pub fn tick(&mut self) -> usize {
        let mut fired = 0;
        for slot in self.slots.iter_mut().flatten() {
            if slot.countdown.decrement() {
                slot.callback.fire();
                fired += 1;
            }
        }
        fired
    }
}

impl<const N: usize> Default for CallbackTimers<N> {
    fn default() -> Self {
        Self::new()
    }
}
