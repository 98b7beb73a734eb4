//! Pooled packet buffers
//!
//! Datagrams arrive at a high rate and live only briefly, so their storage is
//! recycled through a fixed pool instead of being allocated per packet. A
//! [`Packet`] owns its buffer exclusively while it sits in a receive queue or
//! in a caller's hands; releasing it hands the storage back to the pool.

use parking_lot::Mutex;

/// Marks a packet as the last one of an access unit
pub const PACKET_FLAG_END_OF_UNIT: u8 = 0x01;

/// Default number of spare buffers a pool keeps around
const DEFAULT_MAX_POOLED: usize = 64;

/// Reuse pool for packet storage
///
/// `checkout` hands out a cleared buffer with at least the pool's configured
/// capacity; `recycle` takes it back. Buffers returned past the pool bound
/// are dropped rather than hoarded.
pub struct PacketPool {
    /// Capacity every checked-out buffer starts with
    buffer_capacity: usize,

    /// Upper bound on retained spare buffers
    max_pooled: usize,

    /// Spare buffers ready for reuse
    free: Mutex<Vec<Vec<u8>>>,
}

impl PacketPool {
    /// Create a pool whose buffers hold `buffer_capacity` bytes
    pub fn new(buffer_capacity: usize) -> Self {
        Self::with_max_pooled(buffer_capacity, DEFAULT_MAX_POOLED)
    }

    /// Create a pool with an explicit bound on retained spare buffers
    pub fn with_max_pooled(buffer_capacity: usize, max_pooled: usize) -> Self {
        Self {
            buffer_capacity,
            max_pooled,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take a cleared buffer out of the pool, allocating if none is spare
    pub fn checkout(&self) -> Vec<u8> {
        if let Some(buf) = self.free.lock().pop() {
            buf
        } else {
            Vec::with_capacity(self.buffer_capacity)
        }
    }

    /// Return a buffer to the pool
    pub fn recycle(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }

    /// Number of spare buffers currently pooled
    pub fn pooled(&self) -> usize {
        self.free.lock().len()
    }

    /// Capacity newly allocated buffers start with
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }
}

/// A received datagram backed by pooled storage
///
/// Carries a monotonically increasing queue sequence number and flag bits in
/// addition to its bytes. The read offset advances as the packet is drained
/// so one oversized datagram can be consumed across several reads.
#[derive(Debug)]
pub struct Packet {
    data: Vec<u8>,
    offset: usize,
    sequence: u64,
    flags: u8,
}

impl Packet {
    /// Copy `payload` into a pooled buffer and wrap it as a packet
    pub fn copy_from(pool: &PacketPool, payload: &[u8], sequence: u64) -> Self {
        let mut data = pool.checkout();
        data.extend_from_slice(payload);
        Self {
            data,
            offset: 0,
            sequence,
            flags: 0,
        }
    }

    /// Queue sequence number assigned on receipt
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Flag bits carried by this packet
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Set a flag bit
    pub fn set_flag(&mut self, flag: u8) {
        self.flags |= flag;
    }

    /// Check a flag bit
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Unconsumed portion of the payload
    pub fn data(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    /// Advance the read offset by `n` bytes
    pub fn advance(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.data.len());
    }

    /// Consume the packet, returning its storage to the pool
    pub fn release(self, pool: &PacketPool) {
        pool.recycle(self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_reuses_buffers() {
        let pool = PacketPool::new(1500);
        assert_eq!(pool.pooled(), 0);

        let packet = Packet::copy_from(&pool, b"hello", 0);
        packet.release(&pool);
        assert_eq!(pool.pooled(), 1);

        // The recycled buffer comes back cleared.
        let buf = pool.checkout();
        assert!(buf.is_empty());
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_pool_bound() {
        let pool = PacketPool::with_max_pooled(100, 2);
        pool.recycle(Vec::with_capacity(100));
        pool.recycle(Vec::with_capacity(100));
        pool.recycle(Vec::with_capacity(100));
        assert_eq!(pool.pooled(), 2);
    }

    #[test]
    fn test_packet_drain() {
        let pool = PacketPool::new(1500);
        let mut packet = Packet::copy_from(&pool, b"abcdef", 7);

        assert_eq!(packet.sequence(), 7);
        assert_eq!(packet.remaining(), 6);
        assert_eq!(packet.data(), b"abcdef");

        packet.advance(4);
        assert_eq!(packet.remaining(), 2);
        assert_eq!(packet.data(), b"ef");

        // Advancing past the end clamps instead of panicking.
        packet.advance(10);
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn test_packet_flags() {
        let pool = PacketPool::new(64);
        let mut packet = Packet::copy_from(&pool, b"x", 0);

        assert!(!packet.has_flag(PACKET_FLAG_END_OF_UNIT));
        packet.set_flag(PACKET_FLAG_END_OF_UNIT);
        assert!(packet.has_flag(PACKET_FLAG_END_OF_UNIT));
        assert_eq!(packet.flags(), PACKET_FLAG_END_OF_UNIT);
    }
}
