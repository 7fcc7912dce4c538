// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Default (un-remapped) pin assignment for the SPI blocks.
//!
//! | Block | SCK  | MISO | MOSI |
//! |-------|------|------|------|
//! | SPI1  | PA5  | PA6  | PA7  |
//! | SPI2  | PB13 | PB14 | PB15 |
//!
//! On the F1 a pin's function is picked by its MODE/CNF nibble rather than an
//! AF number: outputs go to alternate-function push-pull at 50 MHz, and MISO
//! becomes a floating input. Chip select is an ordinary GPIO output and is
//! not handled here.

use super::{device, Peripheral};

// MODE bits
const OUTPUT_50MHZ: u8 = 0b11;
const INPUT: u8 = 0b00;

// CNF bits
const ALT_PUSH_PULL: u8 = 0b10;
const FLOATING: u8 = 0b01;

pub(crate) fn configure(
    peripheral: Peripheral,
    rcc: &device::rcc::RegisterBlock,
) {
    match peripheral {
        Peripheral::Spi1 => {
            rcc.apb2enr.modify(|_, w| w.iopaen().set_bit());
            // Safety: GPIOA is a fixed MMIO block; we only rewrite the
            // nibbles for pins 5-7.
            let gpioa = unsafe { &*device::GPIOA::ptr() };
            #[allow(unused_unsafe)]
            gpioa.crl.modify(|_, w| unsafe {
                w.mode5()
                    .bits(OUTPUT_50MHZ)
                    .cnf5()
                    .bits(ALT_PUSH_PULL)
                    .mode6()
                    .bits(INPUT)
                    .cnf6()
                    .bits(FLOATING)
                    .mode7()
                    .bits(OUTPUT_50MHZ)
                    .cnf7()
                    .bits(ALT_PUSH_PULL)
            });
        }
        Peripheral::Spi2 => {
            rcc.apb2enr.modify(|_, w| w.iopben().set_bit());
            // Safety: as above, pins 13-15 of GPIOB.
            let gpiob = unsafe { &*device::GPIOB::ptr() };
            #[allow(unused_unsafe)]
            gpiob.crh.modify(|_, w| unsafe {
                w.mode13()
                    .bits(OUTPUT_50MHZ)
                    .cnf13()
                    .bits(ALT_PUSH_PULL)
                    .mode14()
                    .bits(INPUT)
                    .cnf14()
                    .bits(FLOATING)
                    .mode15()
                    .bits(OUTPUT_50MHZ)
                    .cnf15()
                    .bits(ALT_PUSH_PULL)
            });
        }
    }
}
