// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A binary semaphore that interrupt handlers can give.
//!
//! Taking it may block with a timeout and belongs in task code; giving it
//! never blocks and is fine from an interrupt handler. Waiting is a spin on a
//! [`Clock`], so the same code runs on a bare core and under host tests.

use core::sync::atomic::{AtomicBool, Ordering};

/// Source of time for timed waits.
pub trait Clock {
    /// Monotonic milliseconds since some fixed point.
    fn now_ms(&self) -> u64;

    /// Called on every turn of a wait loop.
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn relax(&self) {
        (**self).relax()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimedOut;

pub struct BinarySemaphore {
    available: AtomicBool,
}

impl BinarySemaphore {
    pub const fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    /// Takes the semaphore if it is available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        self.available
            .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Takes the semaphore, waiting up to `timeout_ms` for it.
    ///
    /// Must not be called from an interrupt handler.
    pub fn acquire(
        &self,
        clock: &impl Clock,
        timeout_ms: u64,
    ) -> Result<(), TimedOut> {
        let deadline = clock.now_ms().saturating_add(timeout_ms);
        loop {
            if self.try_acquire() {
                return Ok(());
            }
            if clock.now_ms() >= deadline {
                return Err(TimedOut);
            }
            clock.relax();
        }
    }

    /// Makes the semaphore available. Safe from interrupt handlers.
    pub fn release(&self) {
        self.available.store(true, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}
