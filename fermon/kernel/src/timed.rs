//! Resumable timed operations
//!
//! A timed operation is a state machine whose steps are separated by exact
//! microsecond waits. The owning task polls it from the main loop; once it has
//! armed a wait, the one-shot timer interrupt resumes it instead, and thread
//! polls just report [`Step::Pending`] until the operation has finished.
//!
//! Operations keep every value that must survive a wait in their own fields.
//! `step` is re-entered from the top and dispatches on the saved phase:
//!
//! ```ignore
//! fn step(&mut self, cx: &mut TimedCx<'_>) -> Step {
//!     loop {
//!         match self.phase {
//!             Phase::Lock => {
//!                 if !cx.lock_timer() {
//!                     return Step::Pending;
//!                 }
//!                 self.phase = Phase::Pulse;
//!             }
//!             Phase::Pulse => {
//!                 self.pin_low();
//!                 self.phase = Phase::Release;
//!                 return cx.wait_us(500);
//!             }
//!             Phase::Release => {
//!                 self.phase = Phase::Report;
//!                 if cx.release_timer() == Step::Pending {
//!                     return Step::Pending;
//!                 }
//!             }
//!             Phase::Report => {
//!                 self.phase = Phase::Lock;
//!                 return Step::Done;
//!             }
//!         }
//!     }
//! }
//! ```

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};
use fermon_core::{fm_error, Micros};

use crate::exact::ExactPort;
use crate::timing::TimingStep;

/// Who is invoking the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// The owning task, from the main loop
    Thread,
    /// The one-shot timer interrupt
    Timer,
}

/// Outcome of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Not finished; poll again on a later pass
    Pending,
    /// Finished; results may be read
    Done,
}

impl Step {
    pub const fn is_done(self) -> bool {
        matches!(self, Step::Done)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Step {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Step::Pending => defmt::write!(fmt, "Pending"),
            Step::Done => defmt::write!(fmt, "Done"),
        }
    }
}

/// Body of a timed operation
pub trait TimedOperation: Send {
    fn step(&mut self, cx: &mut TimedCx<'_>) -> Step;
}

/// Entry point recorded by the exact-wait scheduler
pub trait TimedEntry: Sync {
    fn resume(&'static self, cs: CriticalSection<'_>, exact: &mut dyn ExactPort, caller: Caller) -> Step;
}

/// Exact-wait primitives available inside [`TimedOperation::step`]
pub struct TimedCx<'a> {
    exact: &'a mut (dyn ExactPort + 'a),
    caller: Caller,
    me: &'static dyn TimedEntry,
    armed: &'a mut bool,
    held: &'a mut bool,
}

impl<'a> TimedCx<'a> {
    pub fn caller(&self) -> Caller {
        self.caller
    }

    /// Take the exact-wait lock. False means another operation owns it;
    /// return [`Step::Pending`] and retry on the next poll.
    pub fn lock_timer(&mut self) -> bool {
        if *self.held {
            return true;
        }
        match self.exact.try_acquire() {
            Ok(()) => {
                *self.held = true;
                true
            }
            Err(_) => false,
        }
    }

    /// Suspend for at least `us` microseconds; resumed by the timer interrupt.
    pub fn wait_us(&mut self, us: u32) -> Step {
        self.wait(Micros::new(us))
    }

    /// Suspend for a table step's lower bound.
    pub fn wait_step<S>(&mut self, step: &TimingStep<S>) -> Step {
        self.wait(step.duration())
    }

    /// Suspend for at least `duration`.
    ///
    /// Waiting without holding the lock is a bug in the operation. The wait is
    /// then skipped: the next thread poll continues at the saved phase.
    pub fn wait(&mut self, duration: Micros) -> Step {
        if !*self.held {
            fm_error!("exact wait without holding the lock");
            return Step::Pending;
        }
        match self.exact.arm(duration, self.me) {
            Ok(()) => *self.armed = true,
            Err(_) => fm_error!("exact wait rejected"),
        }
        Step::Pending
    }

    /// Give the lock back.
    ///
    /// Returns [`Step::Pending`] under the timer interrupt (the owner sees
    /// completion on its next poll) and [`Step::Done`] under the thread, in
    /// which case the operation may finish in the same invocation.
    pub fn release_timer(&mut self) -> Step {
        if *self.held {
            self.exact.release();
            *self.held = false;
        }
        match self.caller {
            Caller::Timer => Step::Pending,
            Caller::Thread => Step::Done,
        }
    }
}

struct Slot<O> {
    op: O,
    armed: bool,
    held: bool,
}

/// A timed operation placed in a static so the interrupt can resume it
pub struct Timed<O> {
    slot: Mutex<RefCell<Slot<O>>>,
}

impl<O: TimedOperation> Timed<O> {
    pub const fn new(op: O) -> Self {
        Self {
            slot: Mutex::new(RefCell::new(Slot {
                op,
                armed: false,
                held: false,
            })),
        }
    }

    /// Access the operation, e.g. to load a request or read results.
    pub fn with<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        critical_section::with(|cs| f(&mut self.slot.borrow_ref_mut(cs).op))
    }

    /// True while a wait is programmed for this operation.
    pub fn is_waiting(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow_ref(cs).armed)
    }

    /// True while this operation owns the exact-wait lock.
    pub fn holds_lock(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow_ref(cs).held)
    }
}

impl<O: TimedOperation + 'static> TimedEntry for Timed<O> {
    fn resume(&'static self, cs: CriticalSection<'_>, exact: &mut dyn ExactPort, caller: Caller) -> Step {
        let mut slot = self.slot.borrow_ref_mut(cs);
        match caller {
            Caller::Thread if slot.armed => return Step::Pending,
            Caller::Timer => slot.armed = false,
            Caller::Thread => {}
        }
        let Slot { op, armed, held } = &mut *slot;
        let mut cx = TimedCx {
            exact,
            caller,
            me: self,
            armed,
            held,
        };
        op.step(&mut cx)
    }
}
