// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A register-level driver for the STM32F1 SPI, in host (master) mode.
//!
//! This is only the part that touches registers; the transfer protocol lives
//! in `drv-spi-core`, which drives this through the `SpiHardware` trait.
//!
//! # Clocking
//!
//! SPI1 hangs off APB2 and SPI2 off APB1, so the two blocks usually see
//! different input clocks. We can't read the clock tree back reliably without
//! knowing how the board set it up, so the board tells us the APB frequency
//! when it constructs the handle.
//!
//! # Why is everything `spi1`
//!
//! The `stm32f1` PAC derives SPI2 from SPI1, so both register blocks have type
//! `spi1::RegisterBlock`.
//!
//! # Wiring up the interrupt
//!
//! The vector table belongs to the application, so we don't declare handlers
//! here. The application forwards each SPI vector to the port table:
//!
//! ```ignore
//! #[interrupt]
//! fn SPI1() {
//!     PORTS.handle_irq(0);
//! }
//! ```

#![no_std]

mod pins;

use drv_spi_api::{Interrupts, Prescaler, SpiHardware, SpiMode, Status};

#[cfg(feature = "f101")]
use stm32f1::stm32f101 as device;

#[cfg(feature = "f103")]
use stm32f1::stm32f103 as device;

/// Which of the SPI blocks a handle refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Peripheral {
    Spi1,
    Spi2,
}

impl Peripheral {
    fn interrupt(self) -> device::Interrupt {
        match self {
            Self::Spi1 => device::Interrupt::SPI1,
            Self::Spi2 => device::Interrupt::SPI2,
        }
    }
}

/// Handle on one SPI block.
///
/// Unlike the PAC's owned `SPIx` singletons, this is constructible in a
/// `const` context, so a port table holding it can live in a `static`.
#[derive(Copy, Clone, Debug)]
pub struct Spi {
    peripheral: Peripheral,
    bus_clock_hz: u32,
}

impl Spi {
    pub const fn new(peripheral: Peripheral, bus_clock_hz: u32) -> Self {
        Self {
            peripheral,
            bus_clock_hz,
        }
    }

    fn reg(&self) -> &'static device::spi1::RegisterBlock {
        // Safety: these are fixed MMIO addresses, valid for the life of the
        // program. All access goes through the PAC's volatile cells, and the
        // driver core serializes access between task and interrupt.
        unsafe {
            match self.peripheral {
                Peripheral::Spi1 => &*device::SPI1::ptr(),
                Peripheral::Spi2 => &*device::SPI2::ptr(),
            }
        }
    }

    fn rcc(&self) -> &'static device::rcc::RegisterBlock {
        // Safety: as above. We only ever read-modify-write our own enable
        // bits.
        unsafe { &*device::RCC::ptr() }
    }
}

impl SpiHardware for Spi {
    fn bus_clock_hz(&self) -> u32 {
        self.bus_clock_hz
    }

    fn enable_clock(&self) {
        let rcc = self.rcc();
        match self.peripheral {
            Peripheral::Spi1 => rcc.apb2enr.modify(|_, w| w.spi1en().set_bit()),
            Peripheral::Spi2 => rcc.apb1enr.modify(|_, w| w.spi2en().set_bit()),
        }
    }

    fn configure_pins(&self) {
        pins::configure(self.peripheral, self.rcc());
    }

    fn initialize(&self, mode: SpiMode, prescaler: Prescaler) {
        let reg = self.reg();

        // Interrupt sources off before anything else, so that a block left
        // running by a previous owner can't call into the handler halfway
        // through reconfiguration.
        reg.cr2.reset();

        #[rustfmt::skip]
        reg.cr1.write(|w| {
            w
                .cpha().bit(mode.cpha())
                .cpol().bit(mode.cpol())
                // This is a host-only driver.
                .mstr().set_bit()
                .br().bits(prescaler.bits())
                // MSB first.
                .lsbfirst().clear_bit()
                // Software slave management, with the internal NSS held high
                // so that we don't mode-fault ourselves.
                .ssm().set_bit()
                .ssi().set_bit()
                // Full duplex, 8-bit frames, no CRC.
                .rxonly().clear_bit()
                .bidimode().clear_bit()
                .dff().clear_bit()
                .crcen().clear_bit()
                // SPE stays clear until a transaction starts.
                .spe().clear_bit()
        });
    }

    fn unmask_irq(&self) {
        // Safety: the handler for this line only touches the port state it is
        // handed, which was set up by `configure` before we get here.
        unsafe {
            cortex_m::peripheral::NVIC::unmask(self.peripheral.interrupt());
        }
    }

    fn enable_interrupts(&self, irqs: Interrupts) {
        let mask = u32::from(irqs.bits());
        self.reg()
            .cr2
            .modify(|r, w| unsafe { w.bits(r.bits() | mask) });
    }

    fn disable_interrupts(&self, irqs: Interrupts) {
        let mask = u32::from(irqs.bits());
        self.reg()
            .cr2
            .modify(|r, w| unsafe { w.bits(r.bits() & !mask) });
    }

    fn enabled_interrupts(&self) -> Interrupts {
        Interrupts::from_bits_truncate(self.reg().cr2.read().bits() as u8)
    }

    fn start(&self) {
        self.reg().cr1.modify(|_, w| w.spe().set_bit());
    }

    fn stop(&self) {
        self.reg().cr1.modify(|_, w| w.spe().clear_bit());
    }

    fn status(&self) -> Status {
        Status::from_bits_truncate(self.reg().sr.read().bits() as u8)
    }

    fn send8(&self, byte: u8) {
        // With DFF clear only the low byte of DR goes on the wire.
        #[allow(unused_unsafe)]
        self.reg()
            .dr
            .write(|w| unsafe { w.dr().bits(u16::from(byte)) });
    }

    fn recv8(&self) -> u8 {
        self.reg().dr.read().dr().bits() as u8
    }

    fn flush_rx(&self) {
        // OVR clears on a DR read followed by an SR read, in that order.
        let reg = self.reg();
        let _ = reg.dr.read();
        let _ = reg.sr.read();
    }

    fn recover_mode_fault(&self) {
        // MODF clears on an SR access followed by a CR1 write. The fault also
        // knocked MSTR and SPE down, so put both back.
        let reg = self.reg();
        let _ = reg.sr.read();
        reg.cr1.modify(|_, w| w.mstr().set_bit().spe().set_bit());
    }
}
