// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Port settings and baud rate arithmetic.

use drv_spi_api::{Prescaler, SpiError, SpiMode};

/// How long a caller waits, first for the port to go idle and then for its
/// transaction to finish, unless the settings say otherwise.
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Default capacity of each port's transmit and receive queues, and so the
/// longest single transfer.
pub const SPI_MAX_NUM_DATA: usize = 256;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SpiSettings {
    pub mode: SpiMode,
    /// Requested SCK frequency, in Hz. The port runs at the fastest rate the
    /// prescaler can reach that does not exceed this.
    pub baud_rate: u32,
    pub timeout_ms: u64,
}

impl SpiSettings {
    pub const fn new(mode: SpiMode, baud_rate: u32) -> Self {
        Self {
            mode,
            baud_rate,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub const fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        Self { timeout_ms, ..self }
    }
}

/// Picks the smallest power-of-two divisor that brings `bus_clock_hz` down to
/// `baud_rate` or below.
///
/// The divisor is `2^ceil(log2(ceil(bus / baud)))`, so the effective rate is
/// never above the request and always more than half of it. Requests that
/// would need a divisor outside `/2 ..= /256` are refused.
///
/// The divisor always rounds up, even where rounding down would land nearer
/// the request: a device is never clocked faster than it asked for.
pub fn prescaler_for(
    bus_clock_hz: u32,
    baud_rate: u32,
) -> Result<Prescaler, SpiError> {
    if baud_rate == 0 {
        return Err(SpiError::BadBaudRate);
    }

    let ratio = bus_clock_hz.div_ceil(baud_rate);
    if ratio < 2 {
        // Faster than the block can divide down to.
        return Err(SpiError::BadBaudRate);
    }

    // ceil(log2(ratio)) for ratio >= 2. Divisor 2^shift is 2 << BR.
    let shift = u32::BITS - (ratio - 1).leading_zeros();
    u8::try_from(shift - 1)
        .ok()
        .and_then(Prescaler::from_bits)
        .ok_or(SpiError::BadBaudRate)
}

/// The SCK frequency a prescaler actually produces.
pub fn effective_baud_rate(bus_clock_hz: u32, prescaler: Prescaler) -> u32 {
    bus_clock_hz / prescaler.divisor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn eight_mhz_to_one_mhz() {
        let p = prescaler_for(8_000_000, 1_000_000).unwrap();
        assert_eq!(p.divisor(), 8);
        assert_eq!(p.bits(), 2);
        assert_eq!(effective_baud_rate(8_000_000, p), 1_000_000);
    }

    #[test]
    fn rounds_divisor_up() {
        // 72 MHz / 10 MHz = 7.2, so /8 for 9 MHz.
        let p = prescaler_for(72_000_000, 10_000_000).unwrap();
        assert_eq!(p.divisor(), 8);
        assert_eq!(effective_baud_rate(72_000_000, p), 9_000_000);
    }

    #[test]
    fn extremes() {
        assert_eq!(prescaler_for(8_000_000, 4_000_000).unwrap().divisor(), 2);
        assert_eq!(prescaler_for(8_000_000, 5_000_000).unwrap().divisor(), 2);
        assert_eq!(prescaler_for(8_000_000, 31_250).unwrap().divisor(), 256);

        assert_eq!(
            prescaler_for(8_000_000, 8_000_000),
            Err(SpiError::BadBaudRate)
        );
        assert_eq!(
            prescaler_for(8_000_000, 31_249),
            Err(SpiError::BadBaudRate)
        );
        assert_eq!(prescaler_for(72_000_000, 100), Err(SpiError::BadBaudRate));
        assert_eq!(prescaler_for(8_000_000, 0), Err(SpiError::BadBaudRate));
        assert_eq!(prescaler_for(0, 1_000), Err(SpiError::BadBaudRate));
    }

    proptest! {
        #[test]
        fn effective_rate_within_one_step(
            bus in 1_000_000u32..=72_000_000,
            baud in 1u32..=80_000_000,
        ) {
            match prescaler_for(bus, baud) {
                Ok(p) => {
                    let scaled = u64::from(baud) * u64::from(p.divisor());
                    // Not faster than asked for...
                    prop_assert!(scaled >= u64::from(bus));
                    // ...and not a whole step slower than needed.
                    prop_assert!(scaled < 2 * u64::from(bus));
                }
                Err(e) => {
                    prop_assert_eq!(e, SpiError::BadBaudRate);
                    prop_assert!(baud >= bus || bus.div_ceil(baud) > 256);
                }
            }
        }
    }
}
