//! Simulated one-shot timer for host tests

use crate::exact::OneShotTimer;

/// Records what the exact-wait scheduler programs
#[derive(Debug, Default)]
pub struct SimOneShot {
    hz: u32,
    armed: Option<u64>,
    last: Option<u64>,
    starts: u32,
}

impl SimOneShot {
    pub const fn new(hz: u32) -> Self {
        Self {
            hz,
            armed: None,
            last: None,
            starts: 0,
        }
    }

    /// A wait is programmed and has not expired
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Ticks loaded by the most recent `start`
    pub fn last_ticks(&self) -> Option<u64> {
        self.last
    }

    pub fn starts(&self) -> u32 {
        self.starts
    }
}

impl OneShotTimer for SimOneShot {
    fn tick_hz(&self) -> u32 {
        self.hz
    }

    fn start(&mut self, ticks: u64) {
        self.armed = Some(ticks);
        self.last = Some(ticks);
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.armed = None;
    }
}
