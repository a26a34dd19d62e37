//! Per-camera serial numbers with rollover

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Hands out serial numbers `0..=max_serial`, wrapping back to 0.
///
/// The allocator knows nothing about the filesystem; callers seed it with the
/// number of snapshots already on disk via [`initialize_from`](Self::initialize_from).
#[derive(Debug)]
pub struct SerialAllocator {
    counter: Mutex<u32>,
    max_serial: u32,
}

impl SerialAllocator {
    pub fn new(max_serial: u32) -> Self {
        Self::initialize_from(0, max_serial)
    }

    /// Continue numbering after `existing` snapshots.
    pub fn initialize_from(existing: usize, max_serial: u32) -> Self {
        Self {
            counter: Mutex::new(wrap(existing as u64, max_serial)),
            max_serial,
        }
    }

    /// Lock the counter and look at the next serial without consuming it.
    ///
    /// The counter stays locked until the ticket is committed or dropped, so
    /// concurrent callers are served one at a time. Dropping the ticket
    /// without [`SerialTicket::commit`] leaves the counter unchanged.
    pub fn reserve(&self) -> SerialTicket<'_> {
        SerialTicket {
            guard: self.counter.lock().unwrap_or_else(PoisonError::into_inner),
            max_serial: self.max_serial,
        }
    }

    /// Return the current serial and advance past it.
    pub fn next(&self) -> u32 {
        let ticket = self.reserve();
        let serial = ticket.serial();
        ticket.commit();
        serial
    }

    /// Serial the next allocation will return.
    pub fn peek(&self) -> u32 {
        *self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Operator reset, e.g. after wiping stored snapshots.
    pub fn reset(&self, to: u32) {
        self.reserve().reset(to);
    }
}

fn wrap(value: u64, max_serial: u32) -> u32 {
    (value % (u64::from(max_serial) + 1)) as u32
}

/// Exclusive hold on a camera's next serial number
#[derive(Debug)]
pub struct SerialTicket<'a> {
    guard: MutexGuard<'a, u32>,
    max_serial: u32,
}

impl SerialTicket<'_> {
    pub fn serial(&self) -> u32 {
        *self.guard
    }

    /// Consume the serial; the counter wraps to 0 after `max_serial`.
    pub fn commit(mut self) {
        let current = *self.guard;
        *self.guard = if current >= self.max_serial {
            0
        } else {
            current + 1
        };
    }

    /// Move the counter to `to` (wrapped into range) and release it.
    pub fn reset(mut self, to: u32) {
        *self.guard = wrap(u64::from(to), self.max_serial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::identity::SERIAL_LIMIT;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counts_up_from_seed() {
        let alloc = SerialAllocator::initialize_from(5, 100);
        let got: Vec<u32> = (0..4).map(|_| alloc.next()).collect();
        assert_eq!(got, vec![5, 6, 7, 8]);
    }

    #[test]
    fn sequence_is_contiguous_modulo_rollover() {
        let max = 9;
        let start = 7;
        let alloc = SerialAllocator::initialize_from(start, max);
        for i in 0..25u32 {
            assert_eq!(alloc.next(), (start as u32 + i) % (max + 1));
        }
    }

    #[test]
    fn wraps_after_serial_limit() {
        let alloc = SerialAllocator::initialize_from(SERIAL_LIMIT as usize, SERIAL_LIMIT);
        assert_eq!(alloc.next(), 9_999_999);
        assert_eq!(alloc.next(), 0);
        assert_eq!(alloc.next(), 1);
    }

    #[test]
    fn seed_beyond_range_wraps() {
        let alloc = SerialAllocator::initialize_from(12, 9);
        assert_eq!(alloc.next(), 2);
    }

    #[test]
    fn dropped_ticket_does_not_advance() {
        let alloc = SerialAllocator::new(100);
        {
            let ticket = alloc.reserve();
            assert_eq!(ticket.serial(), 0);
        }
        assert_eq!(alloc.peek(), 0);
        assert_eq!(alloc.next(), 0);
        assert_eq!(alloc.peek(), 1);
    }

    #[test]
    fn reset_restarts_numbering() {
        let alloc = SerialAllocator::initialize_from(40, 100);
        alloc.next();
        alloc.reset(0);
        assert_eq!(alloc.next(), 0);
        alloc.reset(17);
        assert_eq!(alloc.next(), 17);
    }

    #[test]
    fn held_ticket_blocks_other_callers_until_reset() {
        let alloc = Arc::new(SerialAllocator::initialize_from(30, 100));
        let ticket = alloc.reserve();

        let waiter = {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || alloc.next())
        };
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!waiter.is_finished());

        ticket.reset(0);
        assert_eq!(waiter.join().unwrap(), 0);
        assert_eq!(alloc.peek(), 1);
    }

    #[test]
    fn concurrent_callers_never_share_a_serial() {
        let alloc = Arc::new(SerialAllocator::new(SERIAL_LIMIT));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                thread::spawn(move || (0..500).map(|_| alloc.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for serial in handle.join().unwrap() {
                assert!(seen.insert(serial), "serial {serial} issued twice");
            }
        }
        assert_eq!(seen.len(), 4000);
        assert_eq!(alloc.peek(), 4000);
    }
}
