#![no_std]
#![forbid(unsafe_code)]

//! # Fermon Cooperative Scheduler
//!
//! Round-robin, run-to-suspension task driver. Every registered task is
//! polled exactly once per pass, in registration order. Tasks are explicit
//! state machines that keep their suspension point in a field; a poll with
//! nothing to do must return immediately.

use fermon_core::{fm_debug, fm_warn, FmError, FmResult};
use heapless::Vec;

/// Default task table size
pub const MAX_TASKS: usize = 8;

/// A resumable task polled by the scheduler
///
/// `C` is whatever the task needs from its environment, usually the kernel.
pub trait Task<C: ?Sized> {
    /// Advance from the saved position until the next suspension point.
    fn poll(&mut self, cx: &C);

    /// Short label for logs
    fn name(&self) -> &'static str {
        "task"
    }
}

/// Cooperative scheduler over borrowed tasks
pub struct Scheduler<'a, C: ?Sized, const N: usize = MAX_TASKS> {
    tasks: Vec<&'a mut dyn Task<C>, N>,
    passes: u32,
}

impl<'a, C: ?Sized, const N: usize> Scheduler<'a, C, N> {
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            passes: 0,
        }
    }

    /// Append a task; it is polled after every task registered before it.
    pub fn register(&mut self, task: &'a mut dyn Task<C>) -> FmResult<()> {
        let name = task.name();
        self.tasks.push(task).map_err(|_| {
            fm_warn!("task table full, {} not registered", name);
            FmError::ResourceExhausted
        })?;
        fm_debug!("registered task {}", name);
        Ok(())
    }

    /// Poll every task once.
    pub fn run_once(&mut self, cx: &C) {
        for task in self.tasks.iter_mut() {
            task.poll(cx);
        }
        self.passes = self.passes.wrapping_add(1);
    }

    /// Run forever. `between` runs after each pass (timer service, idle).
    pub fn run(&mut self, cx: &C, mut between: impl FnMut(&C)) -> ! {
        loop {
            self.run_once(cx);
            between(cx);
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Completed passes, wrapping
    pub fn passes(&self) -> u32 {
        self.passes
    }
}

impl<'a, C: ?Sized, const N: usize> Default for Scheduler<'a, C, N> {
    fn default() -> Self {
        Self::new()
    }
}
