// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::cell::RefCell;
use critical_section::Mutex;
use heapless::Deque;

/// The queue had no room for another byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueueFull;

/// Bounded FIFO of bytes shared between a task and an interrupt handler.
///
/// Every operation runs inside a critical section and never blocks, so either
/// side may call any of them.
pub struct ByteQueue<const N: usize> {
    inner: Mutex<RefCell<Deque<u8, N>>>,
}

impl<const N: usize> ByteQueue<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub fn push(&self, byte: u8) -> Result<(), QueueFull> {
        critical_section::with(|cs| {
            self.inner
                .borrow_ref_mut(cs)
                .push_back(byte)
                .map_err(|_| QueueFull)
        })
    }

    pub fn pop(&self) -> Option<u8> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }

    /// Drops everything queued.
    pub fn reset(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).clear());
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
