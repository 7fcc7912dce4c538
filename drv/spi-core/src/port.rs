// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-side half of a port: configuration and the blocking transfer calls.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use critical_section::Mutex;
use drv_spi_api::{CsState, Interrupts, SpiError, SpiHardware};
use embedded_hal::digital::v2::{OutputPin, StatefulOutputPin};
use ringbuf::ringbuf_entry;

use crate::config::{self, SpiSettings, SPI_MAX_NUM_DATA};
use crate::queue::ByteQueue;
use crate::semaphore::{BinarySemaphore, Clock};
use crate::Trace;

pub(crate) const TX_IRQS: Interrupts = Interrupts::TXE.union(Interrupts::ERR);
pub(crate) const RX_IRQS: Interrupts = Interrupts::RXNE.union(Interrupts::ERR);

/// State only task code touches. The handler never takes this lock.
struct TaskState<CS> {
    cs_pin: Option<CS>,
    settings: Option<SpiSettings>,
}

/// One SPI bus and everything needed to run transactions on it.
///
/// Ports are built in `const` context, typically inside a static
/// [`SpiPorts`](crate::SpiPorts) table, and live for the whole program. A
/// port is unusable until [`Port::configure`] has succeeded.
///
/// Two semaphores guard a port. `idle` is held by a task for the whole of a
/// call, so it is available exactly when no transaction is in flight and is
/// what turns a second caller away with [`SpiError::Busy`]. `done` is the
/// handler's completion signal: released once from interrupt context when the
/// last byte has moved, and consumed by the waiting task.
pub struct Port<H, CS, C, const N: usize = SPI_MAX_NUM_DATA> {
    pub(crate) id: u8,
    pub(crate) hw: H,
    clock: C,
    task: Mutex<RefCell<TaskState<CS>>>,
    pub(crate) tx: ByteQueue<N>,
    pub(crate) rx: ByteQueue<N>,
    pub(crate) idle: BinarySemaphore,
    pub(crate) done: BinarySemaphore,
    pub(crate) rx_remaining: AtomicUsize,
    pub(crate) placeholder: AtomicU8,
    pub(crate) mode_faults: AtomicU32,
}

impl<H, CS, C, const N: usize> Port<H, CS, C, N> {
    /// Creates an unconfigured port. `id` is only used to tag trace entries.
    pub const fn new(id: u8, hw: H, clock: C) -> Self {
        Self {
            id,
            hw,
            clock,
            task: Mutex::new(RefCell::new(TaskState {
                cs_pin: None,
                settings: None,
            })),
            tx: ByteQueue::new(),
            rx: ByteQueue::new(),
            idle: BinarySemaphore::new(true),
            done: BinarySemaphore::new(false),
            rx_remaining: AtomicUsize::new(0),
            placeholder: AtomicU8::new(0),
            mode_faults: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// The settings from the last successful `configure`.
    pub fn settings(&self) -> Option<SpiSettings> {
        critical_section::with(|cs| self.task.borrow_ref(cs).settings)
    }

    /// No transaction is in flight and no task holds the port.
    pub fn is_idle(&self) -> bool {
        self.idle.is_available()
    }

    /// Number of mode faults the handler has recovered from since the port
    /// was last configured.
    pub fn mode_faults(&self) -> u32 {
        self.mode_faults.load(Ordering::Relaxed)
    }

    fn timeout_ms(&self) -> Result<u64, SpiError> {
        self.settings()
            .map(|s| s.timeout_ms)
            .ok_or(SpiError::NotConfigured)
    }
}

impl<H, CS, C, const N: usize> Port<H, CS, C, N>
where
    H: SpiHardware,
    CS: OutputPin + StatefulOutputPin,
    C: Clock,
{
    /// Brings the port up, or reconfigures an idle one.
    ///
    /// The baud rate is checked before anything is touched, so a bad request
    /// leaves the port exactly as it was. On success chip select is idle
    /// (high), both queues are empty, and every SPI interrupt source is off
    /// with the interrupt line unmasked.
    pub fn configure(
        &self,
        settings: SpiSettings,
        mut cs_pin: CS,
    ) -> Result<(), SpiError> {
        let prescaler =
            config::prescaler_for(self.hw.bus_clock_hz(), settings.baud_rate)?;

        // A port being reconfigured is waited on with the timeout it already
        // has; a fresh one with the timeout it is about to get.
        let timeout = self
            .settings()
            .map_or(settings.timeout_ms, |s| s.timeout_ms);
        self.claim(timeout)?;

        self.hw.enable_clock();
        self.hw.configure_pins();

        if cs_pin.set_high().is_err() {
            self.idle.release();
            return Err(SpiError::ChipSelect);
        }

        self.hw.initialize(settings.mode, prescaler);
        self.tx.reset();
        self.rx.reset();
        self.rx_remaining.store(0, Ordering::Relaxed);
        self.mode_faults.store(0, Ordering::Relaxed);
        // Drop any completion left over from an abandoned transaction.
        let _ = self.done.try_acquire();

        critical_section::with(|cs| {
            let mut task = self.task.borrow_ref_mut(cs);
            task.cs_pin = Some(cs_pin);
            task.settings = Some(settings);
        });

        self.hw.unmask_irq();

        ringbuf_entry!(
            crate::SPI_RINGBUF,
            Trace::Configure {
                port: self.id,
                divisor: prescaler.divisor(),
            }
        );
        self.idle.release();
        Ok(())
    }

    /// Clocks `bytes` out, blocking until the handler has sent the last one.
    ///
    /// Whatever comes back on MISO meanwhile is discarded.
    pub fn transmit(&self, bytes: &[u8]) -> Result<(), SpiError> {
        let timeout = self.timeout_ms()?;
        self.claim(timeout)?;
        let r = self.transmit_claimed(bytes, timeout);
        self.idle.release();
        r
    }

    fn transmit_claimed(
        &self,
        bytes: &[u8],
        timeout_ms: u64,
    ) -> Result<(), SpiError> {
        if bytes.is_empty() {
            return Ok(());
        }

        if bytes.len() > self.tx.capacity()
            || bytes.iter().try_for_each(|&b| self.tx.push(b)).is_err()
        {
            self.tx.reset();
            ringbuf_entry!(
                crate::SPI_RINGBUF,
                Trace::QueueFull {
                    port: self.id,
                    len: bytes.len(),
                }
            );
            return Err(SpiError::QueueFull);
        }

        ringbuf_entry!(
            crate::SPI_RINGBUF,
            Trace::Transmit {
                port: self.id,
                len: bytes.len(),
            }
        );

        // From here until the handler signals `done`, the tx queue belongs
        // to the handler.
        self.hw.enable_interrupts(TX_IRQS);
        self.hw.start();

        self.wait_for_handler(TX_IRQS, &self.tx, timeout_ms)
    }

    /// Fills `buf` from MISO, clocking `placeholder` out for every byte.
    pub fn receive(
        &self,
        buf: &mut [u8],
        placeholder: u8,
    ) -> Result<(), SpiError> {
        let timeout = self.timeout_ms()?;
        self.claim(timeout)?;
        let r = self.receive_claimed(buf, placeholder, timeout);
        self.idle.release();
        r
    }

    fn receive_claimed(
        &self,
        buf: &mut [u8],
        placeholder: u8,
        timeout_ms: u64,
    ) -> Result<(), SpiError> {
        if buf.len() > self.rx.capacity() {
            ringbuf_entry!(
                crate::SPI_RINGBUF,
                Trace::QueueFull {
                    port: self.id,
                    len: buf.len(),
                }
            );
            return Err(SpiError::QueueFull);
        }
        if buf.is_empty() {
            return Ok(());
        }

        self.rx.reset();
        // A transmit leaves its echoed bytes (and likely an overrun) behind.
        self.hw.flush_rx();
        self.placeholder.store(placeholder, Ordering::Relaxed);
        self.rx_remaining.store(buf.len(), Ordering::Release);

        ringbuf_entry!(
            crate::SPI_RINGBUF,
            Trace::Receive {
                port: self.id,
                len: buf.len(),
            }
        );

        self.hw.enable_interrupts(RX_IRQS);
        self.hw.start();
        // Each received byte needs a byte clocked out; the handler sends the
        // rest.
        self.hw.send8(placeholder);

        self.wait_for_handler(RX_IRQS, &self.rx, timeout_ms)?;

        let received = core::iter::from_fn(|| self.rx.pop());
        for (slot, byte) in buf.iter_mut().zip(received) {
            *slot = byte;
        }
        self.rx.reset();
        Ok(())
    }

    /// Asserts chip select, transmits `tx`, receives into `rx` clocking out
    /// zeroes, and deasserts chip select.
    ///
    /// The port is held for the whole frame, so no other caller's bytes can
    /// land between the two halves. If either transfer fails the other is
    /// skipped, but chip select is still released. The first error wins.
    pub fn exchange(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError> {
        let timeout = self.timeout_ms()?;
        self.claim(timeout)?;
        let r = self.set_chip_select(CsState::Asserted).and_then(|()| {
            let r = self
                .transmit_claimed(tx, timeout)
                .and_then(|()| self.receive_claimed(rx, 0x00, timeout));
            r.and(self.set_chip_select(CsState::NotAsserted))
        });
        self.idle.release();
        r
    }

    /// Drives chip select. Asserted is low.
    pub fn set_chip_select(&self, state: CsState) -> Result<(), SpiError> {
        critical_section::with(|cs| {
            let mut task = self.task.borrow_ref_mut(cs);
            let pin = task.cs_pin.as_mut().ok_or(SpiError::NotConfigured)?;
            match state {
                CsState::Asserted => pin.set_low(),
                CsState::NotAsserted => pin.set_high(),
            }
            .map_err(|_| SpiError::ChipSelect)
        })
    }

    pub fn chip_select(&self) -> Result<CsState, SpiError> {
        critical_section::with(|cs| {
            let task = self.task.borrow_ref(cs);
            let pin = task.cs_pin.as_ref().ok_or(SpiError::NotConfigured)?;
            match pin.is_set_low() {
                Ok(true) => Ok(CsState::Asserted),
                Ok(false) => Ok(CsState::NotAsserted),
                Err(_) => Err(SpiError::ChipSelect),
            }
        })
    }

    fn claim(&self, timeout_ms: u64) -> Result<(), SpiError> {
        self.idle
            .acquire(&self.clock, timeout_ms)
            .map_err(|_| SpiError::Busy)
    }

    /// Blocks until the handler signals completion, or abandons the
    /// transaction once `timeout_ms` has passed.
    fn wait_for_handler(
        &self,
        irqs: Interrupts,
        queue: &ByteQueue<N>,
        timeout_ms: u64,
    ) -> Result<(), SpiError> {
        if self.done.acquire(&self.clock, timeout_ms).is_ok() {
            return Ok(());
        }

        // Once the sources are off the handler can't run for this port
        // again, so whatever it did before now is final.
        self.hw.disable_interrupts(irqs);
        self.hw.stop();

        if self.done.try_acquire() {
            // Finished just as we gave up.
            return Ok(());
        }

        queue.reset();
        self.rx_remaining.store(0, Ordering::Relaxed);
        ringbuf_entry!(crate::SPI_RINGBUF, Trace::Timeout { port: self.id });
        Err(SpiError::Timeout)
    }
}

/// Lets device drivers written against `embedded-hal` write through a shared
/// port.
impl<H, CS, C, const N: usize> embedded_hal::blocking::spi::Write<u8>
    for &Port<H, CS, C, N>
where
    H: SpiHardware,
    CS: OutputPin + StatefulOutputPin,
    C: Clock,
{
    type Error = SpiError;

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.transmit(words)
    }
}
