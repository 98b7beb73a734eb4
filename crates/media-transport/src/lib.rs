//! Secure real-time media transport and framing
//!
//! This crate implements the wire-level plumbing of a secure media session:
//! a datagram transport adapter that lets a blocking DTLS handshake library
//! share a packet socket with live RTP/RTCP traffic, an H.264 depacketizer
//! that reconstructs NAL units from fragmented RTP payloads, and an RTCP
//! feedback codec for keyframe requests and loss reports.
//!
//! The handshake state machine, ICE negotiation, and the video codec itself
//! are external collaborators; only their transport and framing edges live
//! here.

pub mod buffer;
pub mod dtls;
pub mod error;
pub mod packet;
pub mod payload;

pub use error::Error;

/// Result type for media transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// RTP synchronization source identifier
pub type RtpSsrc = u32;

/// RTP sequence number
pub type RtpSequenceNumber = u16;
