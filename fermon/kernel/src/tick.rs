//! Tick source bookkeeping
//!
//! The tick interrupt raises a flag the main loop consumes. If the flag is
//! still raised when the next tick arrives the main loop is lagging; each such
//! overrun spends one unit of a latency budget that starts at 255.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Initial latency budget
pub const LATENCY_BUDGET: u8 = 255;

/// Interrupt-writable tick state
///
/// All fields are atomics written from the tick interrupt with plain
/// load/store pairs; only that interrupt writes `count` and `budget`.
pub struct TickSource {
    pending: AtomicBool,
    budget: AtomicU8,
    count: AtomicU32,
}

impl TickSource {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            budget: AtomicU8::new(LATENCY_BUDGET),
            count: AtomicU32::new(0),
        }
    }

    /// Record one tick. Returns true if the previous tick was never consumed.
    pub fn on_interrupt(&self) -> bool {
        self.count
            .store(self.count.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
        let overrun = self.pending.load(Ordering::Acquire);
        if overrun {
            let left = self.budget.load(Ordering::Relaxed);
            self.budget.store(left.saturating_sub(1), Ordering::Relaxed);
        }
        self.pending.store(true, Ordering::Release);
        overrun
    }

    /// Consume the tick flag from the main loop.
    pub fn take(&self) -> bool {
        critical_section::with(|_| {
            let was = self.pending.load(Ordering::Acquire);
            self.pending.store(false, Ordering::Release);
            was
        })
    }

    /// Ticks since boot, wrapping.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Number of overruns seen, saturating at 255.
    pub fn overruns(&self) -> u8 {
        LATENCY_BUDGET - self.budget.load(Ordering::Relaxed)
    }
}

impl Default for TickSource {
    fn default() -> Self {
        Self::new()
    }
}
