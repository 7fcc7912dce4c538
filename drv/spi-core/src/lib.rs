// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt-driven SPI master.
//!
//! A blocking caller hands a byte stream to a [`Port`]; the port's interrupt
//! handler then moves one byte per firing and signals the caller once the
//! last one has gone. The register work is behind [`SpiHardware`], so this
//! crate runs unchanged against the STM32F1 driver or a host-side mock.
//!
//! # The task/interrupt hand-off
//!
//! The transmit queue, receive queue and remaining-byte count of a port are
//! owned by exactly one side at a time:
//!
//! - the task fills or drains them only while the port's SPI interrupt
//!   sources are disabled;
//! - enabling TXE/RXNE hands them to the handler;
//! - the handler hands them back by disabling its own sources before it
//!   signals completion, and the task's timeout path does the same by
//!   disabling the sources before touching anything.
//!
//! Enable and disable are the fences. The queues are still wrapped in
//! `critical_section` mutexes so each access is sound on its own, but
//! nothing relies on that for ordering.
//!
//! # Wiring
//!
//! ```ignore
//! static PORTS: SpiPorts<Spi, CsPin, SysTick, 2> = SpiPorts::new([
//!     Port::new(0, Spi::new(Peripheral::Spi1, 72_000_000), SysTick),
//!     Port::new(1, Spi::new(Peripheral::Spi2, 36_000_000), SysTick),
//! ]);
//!
//! #[interrupt]
//! fn SPI1() {
//!     PORTS.handle_irq(0);
//! }
//! ```

#![cfg_attr(not(test), no_std)]

mod config;
mod irq;
mod port;
mod queue;
mod semaphore;


pub use config::{
    effective_baud_rate, prescaler_for, SpiSettings, DEFAULT_TIMEOUT_MS,
    SPI_MAX_NUM_DATA,
};
pub use drv_spi_api::{CsState, SpiError, SpiHardware, SpiMode};
pub use port::Port;
pub use queue::{ByteQueue, QueueFull};
pub use semaphore::{BinarySemaphore, Clock, TimedOut};

use embedded_hal::digital::v2::{OutputPin, StatefulOutputPin};
use ringbuf::ringbuf;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Configure { port: u8, divisor: u32 },
    Transmit { port: u8, len: usize },
    Receive { port: u8, len: usize },
    QueueFull { port: u8, len: usize },
    Tx(u8),
    Rx(u8),
    RxDropped { port: u8 },
    Done { port: u8 },
    Timeout { port: u8 },
    ModeFault { port: u8 },
    Overrun { port: u8 },
}

ringbuf!(SPI_RINGBUF, Trace, 64, Trace::None);

/// The fixed set of ports on a board, indexed by port number.
///
/// Port numbers are what interrupt vectors and callers agree on; anything out
/// of range is [`SpiError::BadPort`].
pub struct SpiPorts<
    H,
    CS,
    C,
    const COUNT: usize,
    const N: usize = SPI_MAX_NUM_DATA,
> {
    ports: [Port<H, CS, C, N>; COUNT],
}

impl<H, CS, C, const COUNT: usize, const N: usize>
    SpiPorts<H, CS, C, COUNT, N>
{
    pub const fn new(ports: [Port<H, CS, C, N>; COUNT]) -> Self {
        Self { ports }
    }

    pub fn port(&self, id: usize) -> Result<&Port<H, CS, C, N>, SpiError> {
        self.ports.get(id).ok_or(SpiError::BadPort)
    }

    pub fn len(&self) -> usize {
        COUNT
    }

    pub fn is_empty(&self) -> bool {
        COUNT == 0
    }
}

impl<H, CS, C, const COUNT: usize, const N: usize>
    SpiPorts<H, CS, C, COUNT, N>
where
    H: SpiHardware,
    CS: OutputPin + StatefulOutputPin,
    C: Clock,
{
    pub fn configure(
        &self,
        id: usize,
        settings: SpiSettings,
        cs_pin: CS,
    ) -> Result<(), SpiError> {
        self.port(id)?.configure(settings, cs_pin)
    }

    pub fn transmit(&self, id: usize, bytes: &[u8]) -> Result<(), SpiError> {
        self.port(id)?.transmit(bytes)
    }

    pub fn receive(
        &self,
        id: usize,
        buf: &mut [u8],
        placeholder: u8,
    ) -> Result<(), SpiError> {
        self.port(id)?.receive(buf, placeholder)
    }

    pub fn exchange(
        &self,
        id: usize,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), SpiError> {
        self.port(id)?.exchange(tx, rx)
    }

    pub fn set_chip_select(
        &self,
        id: usize,
        state: CsState,
    ) -> Result<(), SpiError> {
        self.port(id)?.set_chip_select(state)
    }

    pub fn chip_select(&self, id: usize) -> Result<CsState, SpiError> {
        self.port(id)?.chip_select()
    }
}

impl<H: SpiHardware, CS, C, const COUNT: usize, const N: usize>
    SpiPorts<H, CS, C, COUNT, N>
{
    /// Entry point for the SPI vectors. An unknown port number is ignored:
    /// there is nothing useful to do about it in interrupt context.
    pub fn handle_irq(&self, id: usize) {
        if let Some(port) = self.ports.get(id) {
            port.handle_irq();
        }
    }
}
