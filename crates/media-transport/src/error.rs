//! Error types for media transport operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Buffer doesn't have enough data for the requested operation
    #[error("Buffer too small: required {required} bytes, available {available}")]
    BufferTooSmall {
        /// Required buffer size
        required: usize,
        /// Available buffer size
        available: usize,
    },

    /// Packet is too short to contain a valid header
    #[error("Packet too short")]
    PacketTooShort,

    /// Packet type byte does not name a known packet
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    /// Protocol version field has an unexpected value
    #[error("Invalid protocol version: {0}")]
    InvalidVersion(u8),

    /// The transport has been closed and can no longer send or receive
    #[error("Transport closed")]
    TransportClosed,

    /// Error in the underlying packet connector
    #[error("Transport error: {0}")]
    Transport(String),

    /// A keyframe request could not be delivered
    #[error("Keyframe request failed: {0}")]
    KeyframeRequestFailed(String),
}
