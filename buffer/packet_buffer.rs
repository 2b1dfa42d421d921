// Lockless bounded FIFO with drop-newest overflow
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of packets held while no listener is registered
pub const DEFAULT_PACKET_BUFFER_CAPACITY: usize = 1024;

/// Received-but-undelivered packets of one connection.
///
/// Never grows past its capacity: when full, the incoming packet is refused and
/// counted as dropped, and everything already buffered keeps its order.
pub struct PacketBuffer<T> {
    queue: ArrayQueue<T>,
    dropped: AtomicU64,
}

impl<T> PacketBuffer<T> {
    /// # Panics
    ///
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        PacketBuffer {
            queue: ArrayQueue::new(capacity),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a packet, handing it back if the buffer is full.
    pub fn push(&self, packet: T) -> Result<(), T> {
        self.queue.push(packet).map_err(|packet| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            packet
        })
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Remove packets oldest-first until the buffer is empty.
    pub fn drain(&self) -> Drain<'_, T> {
        Drain { buffer: self }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Packets refused so far because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Default for PacketBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_BUFFER_CAPACITY)
    }
}

pub struct Drain<'a, T> {
    buffer: &'a PacketBuffer<T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.buffer.pop()
    }
}
