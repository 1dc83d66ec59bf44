//! Single-channel ADC access

/// One ADC input sampled on demand
///
/// The first `read` starts a conversion. Later calls return
/// [`nb::Error::WouldBlock`] until the result is in, then the 12-bit value.
pub trait AdcChannel {
    type Error: core::fmt::Debug;

    fn read(&mut self) -> nb::Result<u16, Self::Error>;
}

/// Largest value a 12-bit converter returns
pub const ADC_MAX: u16 = 0x0FFF;
