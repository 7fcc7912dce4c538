// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt-side half of a port.
//!
//! One firing moves at most one byte. Nothing in here blocks, apart from the
//! wait for BSY to drop at the end of a transaction, which lasts at most one
//! frame.

use core::sync::atomic::Ordering;

use drv_spi_api::{Interrupts, SpiHardware, Status};
use ringbuf::ringbuf_entry;

use crate::port::{Port, RX_IRQS, TX_IRQS};
use crate::Trace;

/// Why the handler was entered. A source only counts if its flag is up *and*
/// its interrupt is enabled; when several are, the first listed wins.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Cause {
    TxEmpty,
    RxNotEmpty,
    ModeFault,
    Overrun,
    Other,
}

impl Cause {
    pub(crate) fn decode(status: Status, enabled: Interrupts) -> Self {
        let err = enabled.contains(Interrupts::ERR);
        if status.contains(Status::TXE) && enabled.contains(Interrupts::TXE) {
            Self::TxEmpty
        } else if status.contains(Status::RXNE)
            && enabled.contains(Interrupts::RXNE)
        {
            Self::RxNotEmpty
        } else if status.contains(Status::MODF) && err {
            Self::ModeFault
        } else if status.contains(Status::OVR) && err {
            Self::Overrun
        } else {
            Self::Other
        }
    }
}

impl<H: SpiHardware, CS, C, const N: usize> Port<H, CS, C, N> {
    /// Services this port's interrupt line. Call from the SPI vector.
    pub fn handle_irq(&self) {
        let cause =
            Cause::decode(self.hw.status(), self.hw.enabled_interrupts());

        match cause {
            Cause::TxEmpty => match self.tx.pop() {
                Some(byte) => {
                    self.hw.send8(byte);
                    ringbuf_entry!(crate::SPI_RINGBUF, Trace::Tx(byte));
                }
                None => self.finish(TX_IRQS),
            },
            Cause::RxNotEmpty => {
                let byte = self.hw.recv8();
                if self.rx.push(byte).is_ok() {
                    ringbuf_entry!(crate::SPI_RINGBUF, Trace::Rx(byte));
                } else {
                    ringbuf_entry!(
                        crate::SPI_RINGBUF,
                        Trace::RxDropped { port: self.id }
                    );
                }

                let remaining = self
                    .rx_remaining
                    .load(Ordering::Acquire)
                    .saturating_sub(1);
                self.rx_remaining.store(remaining, Ordering::Release);

                if remaining > 0 {
                    self.hw.send8(self.placeholder.load(Ordering::Relaxed));
                } else {
                    self.finish(RX_IRQS);
                }
            }
            Cause::ModeFault => {
                self.hw.recover_mode_fault();
                self.mode_faults.fetch_add(1, Ordering::Relaxed);
                ringbuf_entry!(
                    crate::SPI_RINGBUF,
                    Trace::ModeFault { port: self.id }
                );
            }
            Cause::Overrun => {
                self.hw.flush_rx();
                ringbuf_entry!(
                    crate::SPI_RINGBUF,
                    Trace::Overrun { port: self.id }
                );
            }
            Cause::Other => (),
        }
    }

    /// Ends the transaction in flight and wakes the task waiting on it.
    fn finish(&self, irqs: Interrupts) {
        self.hw.disable_interrupts(irqs);
        // The last byte is still on its way out when TXE rises.
        while self.hw.status().contains(Status::BSY) {
            core::hint::spin_loop();
        }
        self.hw.flush_rx();
        self.hw.stop();
        ringbuf_entry!(crate::SPI_RINGBUF, Trace::Done { port: self.id });
        self.done.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_sources_only() {
        let all = Status::TXE | Status::RXNE | Status::MODF | Status::OVR;
        assert_eq!(Cause::decode(all, Interrupts::empty()), Cause::Other);
        assert_eq!(Cause::decode(Status::TXE, Interrupts::RXNE), Cause::Other);
        assert_eq!(Cause::decode(Status::OVR, Interrupts::TXE), Cause::Other);
    }

    #[test]
    fn priority_order() {
        let all = Status::TXE | Status::RXNE | Status::MODF | Status::OVR;
        assert_eq!(Cause::decode(all, Interrupts::all()), Cause::TxEmpty);
        assert_eq!(Cause::decode(all, RX_IRQS), Cause::RxNotEmpty);
        assert_eq!(Cause::decode(all, Interrupts::ERR), Cause::ModeFault);
        assert_eq!(
            Cause::decode(Status::OVR | Status::TXE, Interrupts::ERR),
            Cause::Overrun
        );
    }
}
