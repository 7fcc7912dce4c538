// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types shared between the SPI driver core and the register-level drivers
//! underneath it.
//!
//! The `SpiHardware` trait is the seam: `drv-spi-core` owns the transfer
//! protocol and is written entirely against it, and each chip family provides
//! an implementation that pokes the actual registers (`drv-stm32f1-spi`).

#![cfg_attr(not(test), no_std)]

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u32)]
pub enum SpiError {
    /// No port with that number
    BadPort = 1,

    /// Transfer mode outside of the four CPOL/CPHA combinations
    BadMode = 2,

    /// Baud rate not reachable with any available prescaler
    BadBaudRate = 3,

    /// Port used before being configured
    NotConfigured = 4,

    /// Another transaction holds the port
    Busy = 5,

    /// Transfer does not fit in the port's byte queue
    QueueFull = 6,

    /// Transaction did not complete in time and was abandoned
    Timeout = 7,

    /// Chip select pin could not be driven or read
    ChipSelect = 8,
}

impl SpiError {
    /// Returns `true` for errors caused by the caller's arguments, as opposed
    /// to the state of the bus.
    pub fn is_invalid_argument(self) -> bool {
        matches!(self, Self::BadPort | Self::BadMode | Self::BadBaudRate)
    }
}

impl From<SpiError> for u32 {
    fn from(rc: SpiError) -> Self {
        rc as u32
    }
}

impl TryFrom<u32> for SpiError {
    type Error = ();

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_u32(code).ok_or(())
    }
}

/// Clock polarity and phase.
///
/// Bit 0 of the discriminant is CPHA, bit 1 is CPOL, which matches the usual
/// numbering of SPI modes.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum SpiMode {
    /// Idle low, sample on the first (rising) edge
    Mode0 = 0,
    /// Idle low, sample on the second (falling) edge
    Mode1 = 1,
    /// Idle high, sample on the first (falling) edge
    Mode2 = 2,
    /// Idle high, sample on the second (rising) edge
    Mode3 = 3,
}

impl SpiMode {
    /// Clock idles high.
    pub fn cpol(self) -> bool {
        self as u8 & 0b10 != 0
    }

    /// Data is captured on the second clock transition.
    pub fn cpha(self) -> bool {
        self as u8 & 0b01 != 0
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = SpiError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_u8(raw).ok_or(SpiError::BadMode)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CsState {
    NotAsserted = 0,
    Asserted = 1,
}

/// Baud rate prescaler, as the 3-bit `BR` field: the SPI clock is the bus
/// clock divided by `2 << BR`, so `/2` through `/256`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Prescaler(u8);

impl Prescaler {
    pub const MAX_BITS: u8 = 0b111;

    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits <= Self::MAX_BITS {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn divisor(self) -> u32 {
        2 << self.0
    }
}

bitflags! {
    /// Status register flags, at their STM32F1 `SPI_SR` positions.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Status: u8 {
        const RXNE = 1 << 0;
        const TXE = 1 << 1;
        const CRCERR = 1 << 4;
        const MODF = 1 << 5;
        const OVR = 1 << 6;
        const BSY = 1 << 7;
    }

    /// Interrupt enables, at their STM32F1 `SPI_CR2` positions.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Interrupts: u8 {
        const ERR = 1 << 5;
        const RXNE = 1 << 6;
        const TXE = 1 << 7;
    }
}

/// Register-level operations on one SPI block.
///
/// Every method takes `&self`: the hardware is shared between task code and
/// the interrupt handler, and register access is inherently interior-mutable.
/// Implementations must not block, except for `configure_pins` and
/// `enable_clock`, which only run at configuration time.
pub trait SpiHardware {
    /// Frequency of the bus clock feeding the SPI block's prescaler.
    fn bus_clock_hz(&self) -> u32;

    /// Turns on the peripheral clock.
    fn enable_clock(&self);

    /// Muxes SCK, MOSI and MISO onto their default pins.
    fn configure_pins(&self);

    /// Programs the block as a full duplex, 8-bit, MSB-first master with
    /// software slave management, and leaves it disabled with all interrupt
    /// sources off.
    fn initialize(&self, mode: SpiMode, prescaler: Prescaler);

    /// Lets this block's interrupt line through the interrupt controller.
    fn unmask_irq(&self);

    fn enable_interrupts(&self, irqs: Interrupts);
    fn disable_interrupts(&self, irqs: Interrupts);
    fn enabled_interrupts(&self) -> Interrupts;

    /// Sets SPE.
    fn start(&self);

    /// Clears SPE.
    fn stop(&self);

    fn status(&self) -> Status;

    /// Writes one byte to the data register.
    ///
    /// Precondition: TXE is set.
    fn send8(&self, byte: u8);

    /// Reads one byte from the data register.
    ///
    /// Precondition: RXNE is set.
    fn recv8(&self) -> u8;

    /// Discards any received byte and clears an overrun.
    fn flush_rx(&self);

    /// Clears a mode fault and puts the block back into master mode with
    /// SPE set.
    fn recover_mode_fault(&self);
}

impl<T: SpiHardware + ?Sized> SpiHardware for &T {
    fn bus_clock_hz(&self) -> u32 {
        (**self).bus_clock_hz()
    }
    fn enable_clock(&self) {
        (**self).enable_clock()
    }
    fn configure_pins(&self) {
        (**self).configure_pins()
    }
    fn initialize(&self, mode: SpiMode, prescaler: Prescaler) {
        (**self).initialize(mode, prescaler)
    }
    fn unmask_irq(&self) {
        (**self).unmask_irq()
    }
    fn enable_interrupts(&self, irqs: Interrupts) {
        (**self).enable_interrupts(irqs)
    }
    fn disable_interrupts(&self, irqs: Interrupts) {
        (**self).disable_interrupts(irqs)
    }
    fn enabled_interrupts(&self) -> Interrupts {
        (**self).enabled_interrupts()
    }
    fn start(&self) {
        (**self).start()
    }
    fn stop(&self) {
        (**self).stop()
    }
    fn status(&self) -> Status {
        (**self).status()
    }
    fn send8(&self, byte: u8) {
        (**self).send8(byte)
    }
    fn recv8(&self) -> u8 {
        (**self).recv8()
    }
    fn flush_rx(&self) {
        (**self).flush_rx()
    }
    fn recover_mode_fault(&self) {
        (**self).recover_mode_fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_decode_to_cpol_cpha() {
        let table = [
            (SpiMode::Mode0, false, false),
            (SpiMode::Mode1, false, true),
            (SpiMode::Mode2, true, false),
            (SpiMode::Mode3, true, true),
        ];
        for (mode, cpol, cpha) in table {
            assert_eq!(mode.cpol(), cpol, "{mode:?}");
            assert_eq!(mode.cpha(), cpha, "{mode:?}");
            assert_eq!(SpiMode::try_from(mode as u8), Ok(mode));
        }
    }

    #[test]
    fn out_of_range_mode_is_rejected() {
        assert_eq!(SpiMode::try_from(4u8), Err(SpiError::BadMode));
        assert_eq!(SpiMode::try_from(0xffu8), Err(SpiError::BadMode));
    }

    #[test]
    fn error_codes_survive_u32() {
        for e in [SpiError::Busy, SpiError::QueueFull, SpiError::Timeout] {
            assert_eq!(SpiError::try_from(u32::from(e)), Ok(e));
        }
        assert_eq!(SpiError::try_from(0u32), Err(()));
        assert!(SpiError::BadBaudRate.is_invalid_argument());
        assert!(!SpiError::Timeout.is_invalid_argument());
    }

    #[test]
    fn prescaler_range() {
        assert_eq!(Prescaler::from_bits(0).map(Prescaler::divisor), Some(2));
        assert_eq!(Prescaler::from_bits(7).map(Prescaler::divisor), Some(256));
        assert_eq!(Prescaler::from_bits(8), None);
    }
}
