//! In-memory NVM with fault injection

use crate::nvm::Nvm;

/// Fault reported by [`MemNvm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemNvmError {
    /// Peripheral not ready (injected)
    NotReady,
    /// Access past the end of the array
    Bounds,
    /// Read rejected (injected)
    Read,
    /// Program rejected (injected)
    Program,
    /// Power cut mid-program (injected)
    PowerLoss,
}

/// RAM-backed NVM of `SIZE` bytes, erased to 0xFF
pub struct MemNvm<const SIZE: usize> {
    cells: [u8; SIZE],
    init_failures: u32,
    init_calls: u32,
    fail_programs: u32,
    fail_read_at: Option<usize>,
    cut_after: Option<usize>,
    programs: u32,
}

impl<const SIZE: usize> MemNvm<SIZE> {
    pub const fn new() -> Self {
        Self {
            cells: [0xFF; SIZE],
            init_failures: 0,
            init_calls: 0,
            fail_programs: 0,
            fail_read_at: None,
            cut_after: None,
            programs: 0,
        }
    }

    /// Fail the next `n` calls to `init`.
    pub fn fail_init(&mut self, n: u32) {
        self.init_failures = n;
    }

    /// Reject the next `n` program operations without touching cells.
    pub fn fail_programs(&mut self, n: u32) {
        self.fail_programs = n;
    }

    /// Fail the next read that covers byte `addr`.
    pub fn fail_read_at(&mut self, addr: usize) {
        self.fail_read_at = Some(addr);
    }

    /// Cut power during the next program after `bytes` bytes have landed.
    pub fn cut_power_after(&mut self, bytes: usize) {
        self.cut_after = Some(bytes);
    }

    /// Overwrite a cell directly, bypassing the program path.
    pub fn poke(&mut self, addr: usize, value: u8) {
        if let Some(c) = self.cells.get_mut(addr) {
            *c = value;
        }
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn init_calls(&self) -> u32 {
        self.init_calls
    }

    /// Successful program operations
    pub fn programs(&self) -> u32 {
        self.programs
    }

    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>, MemNvmError> {
        let start = addr as usize;
        let end = start.checked_add(len).ok_or(MemNvmError::Bounds)?;
        if end > SIZE {
            return Err(MemNvmError::Bounds);
        }
        Ok(start..end)
    }
}

impl<const SIZE: usize> Default for MemNvm<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> Nvm for MemNvm<SIZE> {
    type Error = MemNvmError;

    fn init(&mut self) -> Result<(), MemNvmError> {
        self.init_calls += 1;
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(MemNvmError::NotReady);
        }
        Ok(())
    }

    fn size(&self) -> u32 {
        SIZE as u32
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MemNvmError> {
        let r = self.range(addr, buf.len())?;
        if self.fail_read_at.is_some_and(|a| r.contains(&a)) {
            self.fail_read_at = None;
            return Err(MemNvmError::Read);
        }
        buf.copy_from_slice(&self.cells[r]);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), MemNvmError> {
        let r = self.range(addr, data.len())?;
        if self.fail_programs > 0 {
            self.fail_programs -= 1;
            return Err(MemNvmError::Program);
        }
        if let Some(n) = self.cut_after.take() {
            let n = n.min(data.len());
            self.cells[r.start..r.start + n].copy_from_slice(&data[..n]);
            return Err(MemNvmError::PowerLoss);
        }
        self.cells[r].copy_from_slice(data);
        self.programs += 1;
        Ok(())
    }

    fn mass_erase(&mut self) -> Result<(), MemNvmError> {
        self.cells = [0xFF; SIZE];
        Ok(())
    }
}
