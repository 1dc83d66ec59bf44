//! Byte-addressable non-volatile memory

/// Non-volatile memory the log store runs on
///
/// Addresses are byte offsets from the start of the device. Programming is
/// word-granular on the target EEPROM, so callers keep `addr` and lengths
/// 4-byte aligned. Erased cells read 0xFF.
pub trait Nvm {
    type Error: core::fmt::Debug;

    /// Bring the peripheral up. May fail transiently right after power-on.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Device size in bytes
    fn size(&self) -> u32;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Program `data` at `addr`, lowest address first.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Return every cell to the erased state.
    fn mass_erase(&mut self) -> Result<(), Self::Error>;
}

/// Word size for programming and raw dumps
pub const WORD_SIZE: u32 = 4;
