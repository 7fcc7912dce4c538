// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trace ring buffer for drivers that run partly in interrupt context.
//!
//! A ring buffer is a fixed-size static array of recent events, meant to be
//! read out of RAM with a debugger after the fact. Recording an event is
//! cheap: no formatting, no I/O, just a copy of a small `Copy` payload plus
//! the source line that recorded it.
//!
//! Events may be recorded from task code *and* from interrupt handlers that
//! preempt that task code, so every access goes through a
//! [`critical_section`]. An interrupt that lands in the middle of a task-side
//! entry simply waits until the entry is complete.
//!
//! ## Declaring and recording
//!
//! ```ignore
//! #[derive(Copy, Clone, PartialEq)]
//! enum Trace {
//!     None,
//!     Tx(u8),
//! }
//!
//! ringbuf!(Trace, 32, Trace::None);
//!
//! ringbuf_entry!(Trace::Tx(0xAA));
//! ```
//!
//! A name may be given to keep more than one ring buffer in a module:
//!
//! ```ignore
//! ringbuf!(IRQ_RINGBUF, u32, 16, 0);
//! ringbuf_entry!(IRQ_RINGBUF, status.bits());
//! ```
//!
//! ## Reading one back
//!
//! With symbols loaded, `print my_crate::__RINGBUF` in GDB shows the entries;
//! `last` is the index of the newest one. Identical consecutive entries (same
//! line, same payload) are folded into one with a bumped `count`, so a tight
//! polling loop does not wipe out the history.

#![cfg_attr(not(test), no_std)]

use core::cell::RefCell;
use critical_section::Mutex;

/// Declares a ring buffer in the current module.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a static called `NAME` holding `N`
/// entries of `Type`, each initialized to `expr`. Omitting the name gives
/// `__RINGBUF`, which is what [`ringbuf_entry!`] uses by default.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::StaticRingbuf<$t, $n> =
            $crate::StaticRingbuf::new($init);
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
    ($t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
}

/// Records `expr` in a ring buffer declared with [`ringbuf!`].
///
/// Safe to call from interrupt handlers.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate both sides in a tuple so that neither expression can see
        // the other's binding.
        let (p, buf) = ($payload, &$buf);
        $crate::StaticRingbuf::entry(buf, line!() as u16, p);
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let _ = &$payload;
    }};
    ($payload:expr) => {{
        let _ = &$payload;
    }};
}

/// One recorded event.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// The ring buffer proper. See [`StaticRingbuf`] for the shareable form.
#[derive(Debug)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: init,
            }; N],
        }
    }

    pub fn entry(&mut self, line: u16, payload: T) {
        // `None` is folded into an out-of-range index: `get_mut` below then
        // finds nothing to merge with, and the wrapping increment lands on
        // slot 0.
        let last = self.last.unwrap_or(usize::MAX);

        if let Some(ent) = self.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                if let Some(count) = ent.count.checked_add(1) {
                    ent.count = count;
                    return;
                }
            }
        }

        // No hardware divide on the smaller parts, so wrap by comparison
        // instead of remainder.
        let next = last.wrapping_add(1);
        let ndx = if next >= N { 0 } else { next };

        let ent = &mut self.buffer[ndx];
        *ent = RingbufEntry {
            line,
            generation: ent.generation.wrapping_add(1),
            count: 1,
            payload,
        };
        self.last = Some(ndx);
    }

    /// Returns the most recently recorded entry, if any.
    pub fn newest(&self) -> Option<&RingbufEntry<T>> {
        self.last.and_then(|i| self.buffer.get(i))
    }
}

/// A [`Ringbuf`] that can live in a `static` and be written from any context.
pub struct StaticRingbuf<T: Copy + PartialEq, const N: usize> {
    inner: Mutex<RefCell<Ringbuf<T, N>>>,
}

impl<T: Copy + PartialEq, const N: usize> StaticRingbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Ringbuf::new(init))),
        }
    }

    pub fn entry(&self, line: u16, payload: T) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).entry(line, payload);
        });
    }

    /// Copies out the newest entry.
    pub fn newest(&self) -> Option<RingbufEntry<T>> {
        critical_section::with(|cs| self.inner.borrow_ref(cs).newest().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_entry_lands_in_slot_zero() {
        let mut rb = Ringbuf::<u8, 4>::new(0);
        assert!(rb.newest().is_none());

        rb.entry(10, 7);
        assert_eq!(rb.last, Some(0));
        let ent = rb.newest().unwrap();
        assert_eq!(
            (ent.line, ent.payload, ent.count, ent.generation),
            (10, 7, 1, 1)
        );
    }

    #[test]
    fn repeats_are_folded() {
        let mut rb = Ringbuf::<u8, 4>::new(0);
        rb.entry(10, 7);
        rb.entry(10, 7);
        rb.entry(10, 7);
        assert_eq!(rb.last, Some(0));
        assert_eq!(rb.buffer[0].count, 3);

        // Same payload from a different line is a new event.
        rb.entry(11, 7);
        assert_eq!(rb.last, Some(1));
    }

    #[test]
    fn wraps_and_bumps_generation() {
        let mut rb = Ringbuf::<u8, 3>::new(0);
        for i in 0..4 {
            rb.entry(1, i);
        }
        assert_eq!(rb.last, Some(0));
        assert_eq!(rb.buffer[0].payload, 3);
        assert_eq!(rb.buffer[0].generation, 2);
        assert_eq!(rb.buffer[1].generation, 1);
    }

    #[test]
    fn static_form_records_through_macro() {
        ringbuf!(TEST_RINGBUF, u16, 8, 0);

        ringbuf_entry!(TEST_RINGBUF, 0xBEEF);
        let ent = TEST_RINGBUF.newest().unwrap();
        assert_eq!(ent.payload, 0xBEEF);
        assert_eq!(ent.count, 1);
    }
}
