//! Byte queue shared between an interrupt handler and the main loop.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

/// Fixed-capacity FIFO guarded by a critical section.
///
/// `const fn new` lets it live in a `static`, so the USB interrupt can push received bytes while
/// the main loop drains them.
pub struct RxQueue<const N: usize> {
    inner: Mutex<RefCell<Deque<u8, N>>>,
}

impl<const N: usize> RxQueue<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Queue as many bytes as fit. Returns how many were dropped.
    pub fn push_slice(&self, bytes: &[u8]) -> usize {
        critical_section::with(|cs| {
            let mut q = self.inner.borrow_ref_mut(cs);
            let mut dropped = 0;
            for &b in bytes {
                if q.push_back(b).is_err() {
                    dropped += 1;
                }
            }
            dropped
        })
    }

    pub fn pop(&self) -> Option<u8> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).clear());
    }
}

impl<const N: usize> Default for RxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SHARED: RxQueue<4> = RxQueue::new();

    #[test]
    fn fifo_order_and_overflow() {
        SHARED.clear();
        assert_eq!(SHARED.push_slice(b"abcdef"), 2);
        assert_eq!(SHARED.len(), 4);
        assert_eq!(SHARED.pop(), Some(b'a'));
        assert_eq!(SHARED.pop(), Some(b'b'));
        SHARED.push_slice(b"x");
        assert_eq!(SHARED.pop(), Some(b'c'));
        assert_eq!(SHARED.pop(), Some(b'd'));
        assert_eq!(SHARED.pop(), Some(b'x'));
        assert!(SHARED.is_empty());
    }
}
