//! Declared timing bounds for bit-banged protocols
//!
//! Each transition of a protocol state machine carries the shortest and
//! longest time allowed before the next action. Waits program the lower
//! bound; [`TimingTable::validate`] checks that the rounded-up hardware wait
//! still lands under the upper bound.

use fermon_core::{fm_error, FmError, FmResult, Micros};

/// One timed transition `(from, min_us, max_us, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingStep<S> {
    pub from: S,
    pub min_us: u32,
    pub max_us: u32,
    pub to: S,
}

impl<S> TimingStep<S> {
    pub const fn new(from: S, min_us: u32, max_us: u32, to: S) -> Self {
        Self {
            from,
            min_us,
            max_us,
            to,
        }
    }

    /// Duration to program for this step
    pub const fn duration(&self) -> Micros {
        Micros::new(self.min_us)
    }
}

/// Static table of a protocol's timed transitions
pub struct TimingTable<S: 'static> {
    steps: &'static [TimingStep<S>],
}

impl<S: Copy + PartialEq> TimingTable<S> {
    pub const fn new(steps: &'static [TimingStep<S>]) -> Self {
        Self { steps }
    }

    /// The step leaving `from`, if it is timed
    pub fn lookup(&self, from: S) -> Option<&'static TimingStep<S>> {
        self.steps.iter().find(|s| s.from == from)
    }

    pub fn steps(&self) -> &'static [TimingStep<S>] {
        self.steps
    }

    /// Check every step against a one-shot timer clocked at `tick_hz`.
    pub fn validate(&self, tick_hz: u32) -> FmResult<()> {
        for step in self.steps {
            if step.min_us > step.max_us {
                fm_error!("timing step min {} > max {}", step.min_us, step.max_us);
                return Err(FmError::InvalidArgument);
            }
            let programmed = step.duration().programmed_at(tick_hz);
            if programmed.as_u32() > step.max_us {
                fm_error!("timing step {}us exceeds {}us at {}Hz", step.min_us, step.max_us, tick_hz);
                return Err(FmError::InvalidArgument);
            }
        }
        Ok(())
    }
}
