//! Circular log store
//!
//! NVM layout:
//!
//! ```text
//! 0        4                  4 + 16·k
//! ┌────────┬────────┬────────┬─────┬────────┐
//! │ config │ slot 0 │ slot 1 │ ... │ slot k │
//! └────────┴────────┴────────┴─────┴────────┘
//! ```
//!
//! Write order lives in the records themselves: every slot carries its
//! sequence number, so after a reboot the next slot to write and the next
//! number to use are recovered from the ring contents alone.

use embedded_hal::delay::DelayNs;
use fermon_core::{fm_debug, fm_error, fm_info, fm_warn, FmError, FmResult};

use crate::config::{ConfigRecord, CONFIG_SIZE};
use crate::nvm::{Nvm, WORD_SIZE};
use crate::record::{next_seq, LogRecord, RECORD_SIZE, SEQ_DOMAIN, SEQ_OFFSET, SEQ_UNWRITTEN};

/// Byte address of the config record
pub const CONFIG_ADDR: u32 = 0;

/// Byte address of slot 0
pub const DATA_ADDR: u32 = 4;

/// Peripheral init attempts before giving up for this boot
pub const INIT_ATTEMPTS: u32 = 200;

/// Delay between init attempts
pub const INIT_BACKOFF_US: u32 = 30_000;

/// Largest usable ring. One lap must not reuse a sequence number.
pub const MAX_CAPACITY: u16 = SEQ_DOMAIN as u16 - 1;

/// Where the next record goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub slot: u16,
    pub seq: u8,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Cursor {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Cursor{{slot: {}, seq: {}}}", self.slot, self.seq);
    }
}

/// Derive the write cursor from the ring's sequence bytes, slot 0 first.
///
/// The next slot is the first one that is unwritten, or that does not
/// continue its predecessor's run: a smaller number after a wrap, or a jump
/// ahead left by an earlier incomplete lap. 253 followed by 0 continues a
/// run. A ring with no break resumes at slot 0.
pub fn scan_ring<I: IntoIterator<Item = u8>>(seqs: I) -> Cursor {
    let mut prev = 0u8;
    for (i, cur) in seqs.into_iter().enumerate() {
        let slot = i as u16;
        // 255 is erased NVM; 254 never gets written
        if cur >= SEQ_DOMAIN {
            let seq = if i == 0 { 0 } else { next_seq(prev) };
            return Cursor { slot, seq };
        }
        if i > 0 && cur != next_seq(prev) {
            return Cursor { slot, seq: next_seq(prev) };
        }
        prev = cur;
    }
    Cursor { slot: 0, seq: next_seq(prev) }
}

/// Counters kept since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub init_attempts: u32,
    pub writes: u32,
    pub write_failures: u32,
}

#[cfg(feature = "defmt")]
impl defmt::Format for StoreStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "StoreStats{{init: {}, writes: {}, failed: {}}}",
            self.init_attempts,
            self.writes,
            self.write_failures
        );
    }
}

/// Append-only ring of [`LogRecord`]s plus the config slot
///
/// Mutated only from the main loop.
pub struct LogStore<N: Nvm> {
    nvm: N,
    ready: bool,
    size: u32,
    capacity: u16,
    cursor: Cursor,
    stats: StoreStats,
}

impl<N: Nvm> LogStore<N> {
    pub const fn new(nvm: N) -> Self {
        Self {
            nvm,
            ready: false,
            size: 0,
            capacity: 0,
            cursor: Cursor { slot: 0, seq: 0 },
            stats: StoreStats {
                init_attempts: 0,
                writes: 0,
                write_failures: 0,
            },
        }
    }

    /// Bring the NVM up, retrying with a backoff, then recover the cursor.
    ///
    /// `InitFailed` leaves the store disabled until the next boot.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> FmResult<()> {
        self.ready = false;
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.stats.init_attempts = attempt;
            match self.nvm.init() {
                Ok(()) => break,
                Err(_) if attempt < INIT_ATTEMPTS => delay.delay_us(INIT_BACKOFF_US),
                Err(_) => {
                    fm_error!("nvm init failed after {} attempts", attempt);
                    return Err(FmError::InitFailed);
                }
            }
        }

        self.size = self.nvm.size();
        let slots = self.size.saturating_sub(DATA_ADDR) / RECORD_SIZE as u32;
        self.capacity = slots.min(MAX_CAPACITY as u32) as u16;
        if self.capacity == 0 {
            fm_error!("nvm of {} bytes holds no records", self.size);
            return Err(FmError::InitFailed);
        }
        self.ready = true;
        fm_info!("nvm ready after {} attempts, {} slots", attempt, self.capacity);

        if let Err(e) = self.recover_next_slot() {
            fm_error!("log recovery failed, store disabled");
            self.ready = false;
            self.cursor = Cursor::default();
            return Err(e);
        }
        Ok(())
    }

    /// Rescan the ring and reset the write cursor. Pure function of NVM
    /// contents; running it twice yields the same cursor.
    pub fn recover_next_slot(&mut self) -> FmResult<Cursor> {
        self.ensure_ready()?;
        let mut seqs = [SEQ_UNWRITTEN; MAX_CAPACITY as usize];
        for slot in 0..self.capacity {
            seqs[slot as usize] = self.read_slot(slot)?[SEQ_OFFSET];
        }
        self.cursor = scan_ring(seqs[..self.capacity as usize].iter().copied());
        fm_info!("log resumes at slot {} seq {}", self.cursor.slot, self.cursor.seq);
        Ok(self.cursor)
    }

    /// Stamp `record.n`, write it to the next slot and advance the cursor.
    ///
    /// The cursor advances even when programming fails; the abandoned slot
    /// keeps its old sequence number and recovery treats it as a gap.
    pub fn write_record(&mut self, record: &mut LogRecord) -> FmResult<u16> {
        self.ensure_ready()?;
        let slot = self.cursor.slot;
        record.n = self.cursor.seq;
        let result = self.nvm.program(Self::slot_addr(slot), &record.to_bytes());

        self.cursor = Cursor {
            slot: (slot + 1) % self.capacity,
            seq: next_seq(self.cursor.seq),
        };

        match result {
            Ok(()) => {
                self.stats.writes += 1;
                fm_debug!("record {} written to slot {}", record.n, slot);
                Ok(slot)
            }
            Err(_) => {
                self.stats.write_failures += 1;
                fm_warn!("record {} lost, slot {} program failed", record.n, slot);
                Err(FmError::WriteFailed)
            }
        }
    }

    /// Read one slot as stored, written or not.
    pub fn read_record(&mut self, slot: u16) -> FmResult<LogRecord> {
        self.ensure_ready()?;
        if slot >= self.capacity {
            return Err(FmError::OutOfRange);
        }
        self.read_slot(slot).map(|b| LogRecord::from_bytes(&b))
    }

    /// Visit written slots oldest first. Returns how many were visited.
    pub fn replay<F: FnMut(u16, LogRecord)>(&mut self, mut f: F) -> FmResult<usize> {
        self.ensure_ready()?;
        let mut visited = 0;
        for i in 0..self.capacity {
            let slot = (self.cursor.slot + i) % self.capacity;
            let record = LogRecord::from_bytes(&self.read_slot(slot)?);
            if record.is_written() {
                f(slot, record);
                visited += 1;
            }
        }
        Ok(visited)
    }

    /// Stored config, or `None` if the device was never configured.
    pub fn read_config(&mut self) -> FmResult<Option<ConfigRecord>> {
        self.ensure_ready()?;
        let mut b = [0u8; CONFIG_SIZE];
        self.nvm
            .read(CONFIG_ADDR, &mut b)
            .map_err(|_| FmError::Unavailable)?;
        Ok(ConfigRecord::from_bytes(&b))
    }

    pub fn write_config(&mut self, config: &ConfigRecord) -> FmResult<()> {
        self.ensure_ready()?;
        self.nvm.program(CONFIG_ADDR, &config.to_bytes()).map_err(|_| {
            fm_warn!("config write failed");
            FmError::WriteFailed
        })
    }

    /// Erase the whole device, config included, and restart at slot 0.
    pub fn erase_all(&mut self) -> FmResult<()> {
        self.ensure_ready()?;
        self.nvm.mass_erase().map_err(|_| FmError::WriteFailed)?;
        self.cursor = Cursor::default();
        fm_warn!("nvm erased");
        Ok(())
    }

    /// Raw 4-byte word at a device byte address.
    pub fn read_word(&mut self, addr: u32) -> FmResult<[u8; 4]> {
        self.ensure_ready()?;
        if addr.checked_add(WORD_SIZE).map_or(true, |end| end > self.size) {
            return Err(FmError::OutOfRange);
        }
        if addr % WORD_SIZE != 0 {
            return Err(FmError::InvalidArgument);
        }
        let mut w = [0u8; 4];
        self.nvm.read(addr, &mut w).map_err(|_| FmError::Unavailable)?;
        Ok(w)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Ring size in slots; 0 until initialized
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn next_slot(&self) -> u16 {
        self.cursor.slot
    }

    pub fn next_sequence(&self) -> u8 {
        self.cursor.seq
    }

    /// NVM size in bytes; 0 until initialized
    pub fn device_size(&self) -> u32 {
        self.size
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    pub fn nvm(&self) -> &N {
        &self.nvm
    }

    pub fn nvm_mut(&mut self) -> &mut N {
        &mut self.nvm
    }

    /// Give the NVM back, e.g. to simulate a reboot.
    pub fn into_nvm(self) -> N {
        self.nvm
    }

    fn ensure_ready(&self) -> FmResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(FmError::Unavailable)
        }
    }

    const fn slot_addr(slot: u16) -> u32 {
        DATA_ADDR + slot as u32 * RECORD_SIZE as u32
    }

    fn read_slot(&mut self, slot: u16) -> FmResult<[u8; RECORD_SIZE]> {
        let mut b = [0u8; RECORD_SIZE];
        self.nvm
            .read(Self::slot_addr(slot), &mut b)
            .map_err(|_| FmError::Unavailable)?;
        Ok(b)
    }
}
