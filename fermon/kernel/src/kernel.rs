//! Kernel state bundle
//!
//! One struct owns every piece of state shared between the main loop and the
//! interrupts. Interrupt-writable fields:
//!
//! | field       | written by                       |
//! |-------------|----------------------------------|
//! | `tick`      | tick interrupt (atomics)         |
//! | `timers`    | tick interrupt, main loop `set`  |
//! | `callbacks` | fast tick interrupt, main loop   |
//! | `exact`     | one-shot interrupt, main loop    |
//!
//! Everything except `tick` sits behind a critical-section mutex.

use core::cell::RefCell;

use critical_section::Mutex;
use fermon_core::{fm_warn, FmResult};

use crate::callbacks::{CallbackHandle, CallbackTimers, TimerCallback};
use crate::exact::{ExactPort, ExactWait, LockState, OneShotTimer};
use crate::tick::TickSource;
use crate::timed::{Caller, Step, TimedEntry};
use crate::timers::{CoarseTimerPool, TimerHandle};

/// Timers, callback slots and the exact-wait scheduler
pub struct Kernel<T> {
    tick: TickSource,
    timers: Mutex<RefCell<CoarseTimerPool>>,
    callbacks: Mutex<RefCell<CallbackTimers>>,
    exact: Mutex<RefCell<ExactWait<T>>>,
}

impl<T: OneShotTimer> Kernel<T> {
    pub const fn new(timer: T) -> Self {
        Self {
            tick: TickSource::new(),
            timers: Mutex::new(RefCell::new(CoarseTimerPool::new())),
            callbacks: Mutex::new(RefCell::new(CallbackTimers::new())),
            exact: Mutex::new(RefCell::new(ExactWait::new(timer))),
        }
    }

    /// Coarse tick interrupt entry
    pub fn on_tick(&self) {
        if self.tick.on_interrupt() {
            fm_warn!("tick overrun, {} total", self.tick.overruns());
        }
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).tick());
    }

    /// Fast tick interrupt entry; fires due callbacks
    pub fn on_fast_tick(&self) {
        critical_section::with(|cs| {
            self.callbacks.borrow_ref_mut(cs).tick();
        });
    }

    /// One-shot timer interrupt entry; resumes the waiting operation
    pub fn on_exact_interrupt(&self) {
        critical_section::with(|cs| {
            self.exact.borrow_ref_mut(cs).on_interrupt(cs);
        });
    }

    /// Consume the tick flag. True once per tick seen since the last call.
    pub fn take_tick(&self) -> bool {
        self.tick.take()
    }

    pub fn tick_source(&self) -> &TickSource {
        &self.tick
    }

    pub fn acquire_timer(&self) -> FmResult<TimerHandle> {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).acquire())
    }

    pub fn set_timer(&self, handle: TimerHandle, ticks: u32) -> FmResult<()> {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).set(handle, ticks))
    }

    /// Level check; a handle this kernel never issued reads as elapsed.
    pub fn timer_elapsed(&self, handle: TimerHandle) -> bool {
        critical_section::with(|cs| self.timers.borrow_ref(cs).elapsed(handle).unwrap_or(true))
    }

    pub fn timer_remaining(&self, handle: TimerHandle) -> u32 {
        critical_section::with(|cs| self.timers.borrow_ref(cs).remaining(handle).unwrap_or(0))
    }

    pub fn attach_callback(&self, callback: &'static dyn TimerCallback) -> FmResult<CallbackHandle> {
        critical_section::with(|cs| self.callbacks.borrow_ref_mut(cs).attach(callback))
    }

    pub fn arm_callback(&self, handle: CallbackHandle, ticks: u32) -> FmResult<()> {
        critical_section::with(|cs| self.callbacks.borrow_ref_mut(cs).arm(handle, ticks))
    }

    /// Poll a timed operation from the main loop.
    pub fn drive(&self, op: &'static dyn TimedEntry) -> Step {
        critical_section::with(|cs| {
            let mut exact = self.exact.borrow_ref_mut(cs);
            op.resume(cs, &mut *exact, Caller::Thread)
        })
    }

    pub fn exact_state(&self) -> LockState {
        critical_section::with(|cs| self.exact.borrow_ref(cs).state())
    }

    /// Inspect the one-shot timer
    pub fn with_timer<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        critical_section::with(|cs| f(self.exact.borrow_ref(cs).timer()))
    }
}

#[cfg(any(test, feature = "sim"))]
impl Kernel<crate::sim::SimOneShot> {
    /// Fire the simulated one-shot until nothing is programmed.
    ///
    /// Returns the number of interrupts delivered, capped at `limit`.
    pub fn run_exact(&self, limit: usize) -> usize {
        let mut fired = 0;
        while fired < limit && self.with_timer(|t| t.is_armed()) {
            self.on_exact_interrupt();
            fired += 1;
        }
        fired
    }
}
