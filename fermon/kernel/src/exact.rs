//! Exact-wait scheduler
//!
//! Wraps the single hardware one-shot timer. One timed operation at a time
//! may hold the lock; while it does, every other operation's `try_acquire`
//! reports [`FmError::WouldBlock`].
//!
//! ```text
//!            try_acquire          arm(us)
//!   Free ───────────────▶ Locked ────────▶ Running
//!    ▲                      │  ▲             │
//!    │       release        │  └─────────────┘
//!    └──────────────────────┘   timer interrupt
//! ```

use critical_section::CriticalSection;
use fermon_core::{fm_trace, FmError, FmResult, Micros};

use crate::timed::{Caller, Step, TimedEntry};

/// Hardware one-shot timer used for microsecond waits
pub trait OneShotTimer: Send {
    /// Input clock of the timer
    fn tick_hz(&self) -> u32;

    /// Load `ticks` and start counting; the interrupt fires once at expiry.
    fn start(&mut self, ticks: u64);

    /// Stop the timer and clear any pending expiry.
    fn stop(&mut self);
}

/// Exact-wait lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Free,
    /// Owned, no wait programmed
    Locked,
    /// Owned, one-shot timer counting
    Running,
}

#[cfg(feature = "defmt")]
impl defmt::Format for LockState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            LockState::Free => defmt::write!(fmt, "Free"),
            LockState::Locked => defmt::write!(fmt, "Locked"),
            LockState::Running => defmt::write!(fmt, "Running"),
        }
    }
}

/// Object-safe view of the exact-wait scheduler handed to timed operations
pub trait ExactPort {
    fn state(&self) -> LockState;

    /// Free → Locked, or `WouldBlock`.
    fn try_acquire(&mut self) -> FmResult<()>;

    /// Locked → Running; programs the one-shot timer and records `target`
    /// as the operation to resume from the interrupt.
    fn arm(&mut self, duration: Micros, target: &'static dyn TimedEntry) -> FmResult<()>;

    /// Locked/Running → Free; forgets the resume target.
    fn release(&mut self);
}

/// The exact-wait scheduler state, owned by the kernel
pub struct ExactWait<T> {
    timer: T,
    state: LockState,
    target: Option<&'static dyn TimedEntry>,
    arms: u32,
}

impl<T: OneShotTimer> ExactWait<T> {
    pub const fn new(timer: T) -> Self {
        Self {
            timer,
            state: LockState::Free,
            target: None,
            arms: 0,
        }
    }

    /// One-shot timer interrupt entry.
    ///
    /// Drops back to Locked and resumes the recorded operation with
    /// [`Caller::Timer`]. The operation either arms again or releases.
    /// Returns `None` for a spurious expiry with nothing running.
    pub fn on_interrupt(&mut self, cs: CriticalSection<'_>) -> Option<Step> {
        self.timer.stop();
        if self.state != LockState::Running {
            return None;
        }
        self.state = LockState::Locked;
        let target = self.target?;
        Some(target.resume(cs, self, Caller::Timer))
    }

    /// Total number of waits programmed since boot
    pub fn arms(&self) -> u32 {
        self.arms
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

impl<T: OneShotTimer> ExactPort for ExactWait<T> {
    fn state(&self) -> LockState {
        self.state
    }

    fn try_acquire(&mut self) -> FmResult<()> {
        if self.state != LockState::Free {
            return Err(FmError::WouldBlock);
        }
        self.state = LockState::Locked;
        Ok(())
    }

    fn arm(&mut self, duration: Micros, target: &'static dyn TimedEntry) -> FmResult<()> {
        if self.state != LockState::Locked {
            return Err(FmError::InvalidArgument);
        }
        let ticks = duration.to_timer_ticks(self.timer.tick_hz()).max(1);
        fm_trace!("exact wait {} ticks", ticks);
        self.target = Some(target);
        self.state = LockState::Running;
        self.arms = self.arms.wrapping_add(1);
        self.timer.start(ticks);
        Ok(())
    }

    fn release(&mut self) {
        self.timer.stop();
        self.target = None;
        self.state = LockState::Free;
    }
}
