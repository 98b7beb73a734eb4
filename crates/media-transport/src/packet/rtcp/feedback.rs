//! RTCP feedback packets
//!
//! Encodes and decodes the fixed-header feedback message defined in RFC 4585
//! (transport-layer and payload-specific feedback), the wire messages used to
//! ask a remote peer for a keyframe or report loss.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP protocol version
pub const RTCP_VERSION: u8 = 2;

/// Fixed feedback header length: common header + both SSRC fields
pub const FEEDBACK_HEADER_LEN: usize = 12;

/// Generic NACK feedback message type (transport-layer)
pub const FMT_GENERIC_NACK: u8 = 1;

/// Picture loss indication feedback message type (payload-specific)
pub const FMT_PLI: u8 = 1;

/// Full intra request feedback message type (payload-specific)
pub const FMT_FIR: u8 = 4;

/// RTCP packet type of a feedback message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RtcpFeedbackType {
    /// Transport-layer feedback (RTPFB)
    TransportLayer = 205,

    /// Payload-specific feedback (PSFB)
    PayloadSpecific = 206,
}

impl RtcpFeedbackType {
    /// Classify a packet type byte, or `None` if it is not feedback
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            205 => Some(RtcpFeedbackType::TransportLayer),
            206 => Some(RtcpFeedbackType::PayloadSpecific),
            _ => None,
        }
    }
}

/// Whether the buffer holds a transport-layer feedback packet
///
/// Looks only at the packet type byte; no further validation.
pub fn is_transport_feedback(data: &[u8]) -> bool {
    data.len() > 1 && data[1] == RtcpFeedbackType::TransportLayer as u8
}

/// Whether the buffer holds a payload-specific feedback packet
pub fn is_payload_specific_feedback(data: &[u8]) -> bool {
    data.len() > 1 && data[1] == RtcpFeedbackType::PayloadSpecific as u8
}

/// RTCP feedback packet (RTPFB or PSFB)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpFeedback {
    /// Feedback message type (FMT, 5 bits)
    pub fmt: u8,

    /// Transport-layer or payload-specific
    pub packet_type: RtcpFeedbackType,

    /// SSRC of the packet sender
    pub sender_ssrc: RtpSsrc,

    /// SSRC of the media source this feedback is about
    pub source_ssrc: RtpSsrc,

    /// Feedback control information
    pub fci: Bytes,
}

impl RtcpFeedback {
    /// Create a feedback packet
    pub fn new(
        fmt: u8,
        packet_type: RtcpFeedbackType,
        sender_ssrc: RtpSsrc,
        source_ssrc: RtpSsrc,
        fci: Bytes,
    ) -> Self {
        Self {
            fmt: fmt & 0x1f,
            packet_type,
            sender_ssrc,
            source_ssrc,
            fci,
        }
    }

    /// Create a picture loss indication (no FCI)
    pub fn pli(sender_ssrc: RtpSsrc, source_ssrc: RtpSsrc) -> Self {
        Self::new(
            FMT_PLI,
            RtcpFeedbackType::PayloadSpecific,
            sender_ssrc,
            source_ssrc,
            Bytes::new(),
        )
    }

    /// Create a full intra request with a single FCI entry
    pub fn fir(sender_ssrc: RtpSsrc, source_ssrc: RtpSsrc, command_seq: u8) -> Self {
        let mut fci = BytesMut::with_capacity(8);
        fci.put_u32(source_ssrc);
        fci.put_u8(command_seq);
        fci.put_bytes(0, 3);
        Self::new(
            FMT_FIR,
            RtcpFeedbackType::PayloadSpecific,
            sender_ssrc,
            source_ssrc,
            fci.freeze(),
        )
    }

    /// Wire size in bytes, always a multiple of 4
    pub fn size(&self) -> usize {
        let fci_padded = (self.fci.len() + 3) & !3;
        FEEDBACK_HEADER_LEN + fci_padded
    }

    /// Serialize the feedback packet to bytes
    pub fn serialize(&self) -> Result<Bytes> {
        let size = self.size();
        let mut buf = BytesMut::with_capacity(size);

        buf.put_u8((RTCP_VERSION << 6) | self.fmt);
        buf.put_u8(self.packet_type as u8);
        // Length in 32-bit words minus one, header included.
        buf.put_u16((size / 4 - 1) as u16);
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.source_ssrc);
        buf.put_slice(&self.fci);
        buf.put_bytes(0, size - FEEDBACK_HEADER_LEN - self.fci.len());

        Ok(buf.freeze())
    }

    /// Parse a feedback packet
    ///
    /// The FCI is a zero-copy view into `buf`, bounded by the declared
    /// length field. Trailing bytes past the declared length are ignored
    /// (compound RTCP), but a declared length past the end of the buffer is
    /// an error.
    pub fn parse(buf: &Bytes) -> Result<Self> {
        if buf.len() < FEEDBACK_HEADER_LEN {
            return Err(Error::PacketTooShort);
        }

        let mut header = &buf[..FEEDBACK_HEADER_LEN];
        let first = header.get_u8();
        let version = first >> 6;
        if version != RTCP_VERSION {
            return Err(Error::InvalidVersion(version));
        }
        let fmt = first & 0x1f;

        let pt = header.get_u8();
        let packet_type = RtcpFeedbackType::from_u8(pt).ok_or(Error::InvalidPacketType(pt))?;

        let length_words = header.get_u16() as usize;
        let total = (length_words + 1) * 4;
        if total < FEEDBACK_HEADER_LEN {
            return Err(Error::PacketTooShort);
        }
        if buf.len() < total {
            return Err(Error::BufferTooSmall {
                required: total,
                available: buf.len(),
            });
        }

        let sender_ssrc = header.get_u32();
        let source_ssrc = header.get_u32();
        let fci = buf.slice(FEEDBACK_HEADER_LEN..total);

        Ok(Self {
            fmt,
            packet_type,
            sender_ssrc,
            source_ssrc,
            fci,
        })
    }
}
