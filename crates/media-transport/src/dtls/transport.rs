//! Secure datagram transport adapter
//!
//! Bridges a handshake library's blocking send/receive calls onto a packet
//! connector that is shared with live RTP/RTCP traffic. Outgoing handshake
//! records are batched per flight so each flight crosses the network as a
//! single datagram; inbound datagrams are queued by the network thread and
//! drained synchronously by the handshake thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::buffer::{Packet, PacketPool};
use crate::error::Error;
use crate::Result;

use super::record::{ContentType, HandshakeType, DATAGRAM_LIMIT, DTLS_RECORD_HEADER_LEN};

/// Default bound on queued inbound datagrams
const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Underlying packet socket shared with media traffic
///
/// The adapter hands flushed flights (and unbatched records) to this trait;
/// the RTCP send path reuses it for feedback packets.
pub trait DatagramConnector: Send + Sync {
    /// Send one datagram
    fn send_datagram(&self, payload: &[u8]) -> Result<()>;
}

/// How long a receive call may block when the queue is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveTimeout {
    /// Return immediately if nothing is queued
    NonBlocking,

    /// Block up to the given duration
    Bounded(Duration),

    /// Block until a datagram arrives or the transport closes
    Blocking,
}

impl ReceiveTimeout {
    /// Map the millisecond convention used by blocking handshake libraries
    /// (negative = forever, zero = poll, positive = bounded)
    pub fn from_millis(millis: i64) -> Self {
        if millis < 0 {
            ReceiveTimeout::Blocking
        } else if millis == 0 {
            ReceiveTimeout::NonBlocking
        } else {
            ReceiveTimeout::Bounded(Duration::from_millis(millis as u64))
        }
    }
}

struct ReceiveQueue {
    packets: VecDeque<Packet>,
    capacity: usize,
    next_sequence: u64,
    closed: bool,
}

struct FlightBuffer {
    data: Vec<u8>,
}

/// Datagram transport handed to the DTLS handshake library
///
/// One instance serves exactly one handshake session. The receive queue and
/// the flight buffer are guarded separately so a flush never blocks a
/// concurrent receive.
pub struct DtlsDatagramTransport {
    connector: Mutex<Option<Arc<dyn DatagramConnector>>>,
    pool: Arc<PacketPool>,
    queue: Mutex<ReceiveQueue>,
    queue_cond: Condvar,
    flight: Mutex<FlightBuffer>,
    send_limit: usize,
    receive_limit: usize,
}

impl DtlsDatagramTransport {
    /// Create an adapter over `connector` with the default queue capacity
    pub fn new(connector: Arc<dyn DatagramConnector>, pool: Arc<PacketPool>) -> Self {
        Self::with_queue_capacity(connector, pool, DEFAULT_QUEUE_CAPACITY)
    }

    /// Create an adapter with an explicit receive queue capacity
    pub fn with_queue_capacity(
        connector: Arc<dyn DatagramConnector>,
        pool: Arc<PacketPool>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            connector: Mutex::new(Some(connector)),
            pool,
            queue: Mutex::new(ReceiveQueue {
                packets: VecDeque::with_capacity(queue_capacity),
                capacity: queue_capacity,
                next_sequence: 0,
                closed: false,
            }),
            queue_cond: Condvar::new(),
            flight: Mutex::new(FlightBuffer {
                data: Vec::with_capacity(DATAGRAM_LIMIT),
            }),
            send_limit: DATAGRAM_LIMIT,
            receive_limit: DATAGRAM_LIMIT,
        }
    }

    /// Largest datagram the handshake library may hand to `send`
    pub fn send_limit(&self) -> usize {
        self.send_limit
    }

    /// Largest datagram `receive` may yield
    pub fn receive_limit(&self) -> usize {
        self.receive_limit
    }

    /// Send one DTLS record
    ///
    /// Records belonging to an in-progress flight are accumulated and sent
    /// as a single datagram when the flight ends; alert and application-data
    /// records bypass the batching entirely.
    pub fn send(&self, record: &[u8]) -> Result<()> {
        // Fail before buffering: a record appended to the flight of a
        // closed transport would be silently accepted and never flushed.
        if self.connector.lock().is_none() {
            return Err(Error::TransportClosed);
        }
        if record.is_empty() {
            return Ok(());
        }

        match ContentType::from(record[0]) {
            ContentType::ChangeCipherSpec => self.accumulate(record, false),
            ContentType::Handshake => {
                let ends_flight = match record.get(DTLS_RECORD_HEADER_LEN) {
                    Some(&byte) => {
                        let msg_type = HandshakeType::from(byte);
                        if msg_type == HandshakeType::Invalid {
                            // Lenient: flush rather than stall the flight.
                            warn!(
                                message_type = byte,
                                "unknown handshake message type, treating as end of flight"
                            );
                        }
                        msg_type.ends_flight()
                    }
                    None => {
                        warn!(
                            len = record.len(),
                            "handshake record shorter than its header, treating as end of flight"
                        );
                        true
                    }
                };
                self.accumulate(record, ends_flight)
            }
            ContentType::Alert | ContentType::ApplicationData => self.send_now(record),
            ContentType::Invalid => {
                debug!(
                    content_type = record[0],
                    "unrecognized content type, sending record unbatched"
                );
                self.send_now(record)
            }
        }
    }

    /// Block until inbound bytes are available, then copy them into `buf`
    ///
    /// Returns `Ok(None)` when no datagram at all arrived before the timeout
    /// expired, which the handshake library takes as its cue to retransmit
    /// the outbound flight. Otherwise returns the number of bytes copied
    /// (possibly zero) from at most one queued datagram; a datagram larger
    /// than `buf` stays at the queue head with its offset advanced, so
    /// datagram boundaries are never blurred.
    pub fn receive(&self, buf: &mut [u8], timeout: ReceiveTimeout) -> Result<Option<usize>> {
        let deadline = match timeout {
            ReceiveTimeout::Bounded(duration) => Some(Instant::now() + duration),
            _ => None,
        };

        let mut queue = self.queue.lock();
        loop {
            if queue.closed {
                return Err(Error::TransportClosed);
            }
            if !queue.packets.is_empty() {
                break;
            }
            match timeout {
                ReceiveTimeout::NonBlocking => return Ok(None),
                ReceiveTimeout::Blocking => {
                    self.queue_cond.wait(&mut queue);
                }
                ReceiveTimeout::Bounded(_) => {
                    let now = Instant::now();
                    let deadline = deadline.unwrap_or(now);
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.queue_cond.wait_for(&mut queue, deadline - now);
                }
            }
        }

        let copied = match queue.packets.front_mut() {
            Some(packet) => {
                let n = packet.remaining().min(buf.len());
                buf[..n].copy_from_slice(&packet.data()[..n]);
                packet.advance(n);
                n
            }
            None => 0,
        };

        let drained = queue
            .packets
            .front()
            .map(|packet| packet.remaining() == 0)
            .unwrap_or(false);
        if drained {
            if let Some(packet) = queue.packets.pop_front() {
                packet.release(&self.pool);
            }
        }

        Ok(Some(copied))
    }

    /// Enqueue inbound datagram bytes from the network thread
    ///
    /// The bytes are copied into a pooled buffer; if the queue is at
    /// capacity the oldest datagram is evicted and recycled. One blocked
    /// receiver is woken.
    pub fn queue_receive(&self, data: &[u8]) {
        let mut queue = self.queue.lock();
        if queue.closed {
            debug!("dropping inbound datagram, transport is closed");
            return;
        }
        if queue.packets.len() >= queue.capacity {
            if let Some(oldest) = queue.packets.pop_front() {
                debug!(
                    sequence = oldest.sequence(),
                    "receive queue full, evicting oldest datagram"
                );
                oldest.release(&self.pool);
            }
        }
        let sequence = queue.next_sequence;
        queue.next_sequence += 1;
        let packet = Packet::copy_from(&self.pool, data, sequence);
        queue.packets.push_back(packet);
        drop(queue);
        self.queue_cond.notify_one();
    }

    /// Close the transport
    ///
    /// Detaches the underlying connector, recycles everything still queued
    /// and wakes all blocked waiters, which then observe the closed state
    /// and fail.
    pub fn close(&self) {
        *self.connector.lock() = None;
        let mut queue = self.queue.lock();
        queue.closed = true;
        while let Some(packet) = queue.packets.pop_front() {
            packet.release(&self.pool);
        }
        drop(queue);
        self.queue_cond.notify_all();
    }

    /// Number of datagrams currently queued
    pub fn queued(&self) -> usize {
        self.queue.lock().packets.len()
    }

    fn connector(&self) -> Result<Arc<dyn DatagramConnector>> {
        self.connector.lock().clone().ok_or(Error::TransportClosed)
    }

    fn send_now(&self, payload: &[u8]) -> Result<()> {
        self.connector()?.send_datagram(payload)
    }

    fn accumulate(&self, record: &[u8], ends_flight: bool) -> Result<()> {
        let mut flight = self.flight.lock();

        if !flight.data.is_empty() && flight.data.len() + record.len() > self.send_limit {
            self.flush(&mut flight)?;
        }
        if record.len() > self.send_limit {
            // Oversized record, nothing to gain from batching it.
            debug!(len = record.len(), "record exceeds send limit, sending standalone");
            return self.send_now(record);
        }

        flight.data.extend_from_slice(record);
        if ends_flight {
            self.flush(&mut flight)?;
        }
        Ok(())
    }

    fn flush(&self, flight: &mut FlightBuffer) -> Result<()> {
        if flight.data.is_empty() {
            return Ok(());
        }
        let result = self.send_now(&flight.data);
        flight.data.clear();
        result
    }
}
