//! Fixed ring of receive slots shared by the receive state machine (producer)
//! and the main loop (consumer).

use crate::chain::{ChainError, SegmentId, SegmentPool};
use crate::frame::Protocol;
use thiserror::Error;

/// A received, checksum-validated frame waiting to be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxSlot {
    pub segment: SegmentId,
    pub protocol: Protocol,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("all {capacity} receive slots are pending")]
pub struct QueueFull {
    pub capacity: usize,
}

#[derive(Debug)]
pub struct PacketQueue {
    slots: Vec<SegmentId>,
    protocols: Vec<Protocol>,
    write_index: usize,
    read_index: usize,
    count: usize,
}

impl PacketQueue {
    /// Allocates `slots` segments of `slot_capacity` bytes each from `pool`.
    pub fn new(pool: &mut SegmentPool, slots: usize, slot_capacity: usize) -> Result<Self, ChainError> {
        let slots = (0..slots)
            .map(|_| pool.create_zeroed(slot_capacity))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            protocols: vec![Protocol::Unknown(0); slots.len()],
            slots,
            write_index: 0,
            read_index: 0,
            count: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// The slot the next frame is written into, or `None` while every slot is
    /// still waiting to be drained.
    pub fn write_slot(&self) -> Option<SegmentId> {
        if self.is_full() {
            None
        } else {
            Some(self.slots[self.write_index])
        }
    }

    /// Commits the write slot. Never blocks.
    pub fn try_enqueue(&mut self, protocol: Protocol) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull {
                capacity: self.capacity(),
            });
        }

        self.protocols[self.write_index] = protocol;
        self.write_index = (self.write_index + 1) % self.slots.len();
        self.count += 1;
        Ok(())
    }

    /// Hands out the oldest committed slot.
    ///
    /// The slot's bytes stay untouched until the receive side wraps around to
    /// it again, which cannot happen before the caller yields back.
    pub fn try_dequeue(&mut self) -> Option<RxSlot> {
        if self.is_empty() {
            return None;
        }

        let slot = RxSlot {
            segment: self.slots[self.read_index],
            protocol: self.protocols[self.read_index],
        };
        self.read_index = (self.read_index + 1) % self.slots.len();
        self.count -= 1;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(slots: usize) -> (SegmentPool, PacketQueue) {
        let mut pool = SegmentPool::with_capacity(slots);
        let queue = PacketQueue::new(&mut pool, slots, 8).unwrap();
        (pool, queue)
    }

    #[test]
    fn starts_empty() {
        let (_pool, mut queue) = queue(2);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 2);
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn fifo_across_wraparound() {
        let (_pool, mut queue) = queue(2);
        let protocols = [Protocol::Ip, Protocol::Lcp, Protocol::Unknown(7), Protocol::Ip];

        let mut drained = Vec::new();
        for pair in protocols.chunks(2) {
            for &protocol in pair {
                queue.try_enqueue(protocol).unwrap();
            }
            while let Some(slot) = queue.try_dequeue() {
                drained.push(slot.protocol);
            }
        }

        assert_eq!(drained, protocols);
    }

    #[test]
    fn slots_alternate_between_segments() {
        let (_pool, mut queue) = queue(2);
        let first = queue.write_slot().unwrap();
        queue.try_enqueue(Protocol::Ip).unwrap();
        let second = queue.write_slot().unwrap();

        assert_ne!(first, second);
        assert_eq!(queue.try_dequeue().unwrap().segment, first);
    }

    #[test]
    fn full_queue_refuses_and_keeps_pending_slots() {
        let (_pool, mut queue) = queue(2);
        queue.try_enqueue(Protocol::Ip).unwrap();
        queue.try_enqueue(Protocol::Lcp).unwrap();

        assert!(queue.is_full());
        assert_eq!(queue.write_slot(), None);
        assert_eq!(queue.try_enqueue(Protocol::Ip), Err(QueueFull { capacity: 2 }));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.try_dequeue().unwrap().protocol, Protocol::Ip);
        assert_eq!(queue.try_dequeue().unwrap().protocol, Protocol::Lcp);
    }

    #[test]
    fn allocation_fails_with_small_pool() {
        let mut pool = SegmentPool::with_capacity(1);
        assert!(PacketQueue::new(&mut pool, 2, 8).is_err());
    }
}
