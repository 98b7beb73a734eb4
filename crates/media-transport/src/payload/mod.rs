//! RTP payload deframing
//!
//! H.264 payloads arrive either as one complete NAL unit per packet, as a
//! STAP-A aggregate, or split across FU-A fragments. This module turns them
//! back into an Annex-B byte stream for the decoder and drives keyframe
//! recovery when the stream is damaged.

pub mod h264;
pub mod keyframe;

pub use h264::{is_keyframe, H264Depacketizer};
pub use keyframe::{KeyframeRequester, KeyframeScheduler, RtcpKeyframeRequester};

/// Mask selecting the NAL unit type from a NAL header byte
pub const NAL_TYPE_MASK: u8 = 0x1f;

/// Instantaneous decoder refresh slice (a keyframe)
pub const NAL_IDR: u8 = 5;

/// Supplemental enhancement information
pub const NAL_SEI: u8 = 6;

/// Sequence parameter set
pub const NAL_SPS: u8 = 7;

/// Picture parameter set
pub const NAL_PPS: u8 = 8;

/// Single-time aggregation packet
pub const NAL_STAP_A: u8 = 24;

/// Fragmentation unit
pub const NAL_FU_A: u8 = 28;

/// Annex-B start code prefixed to every output NAL unit
pub const NAL_START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Zeroed lookahead region appended after every completed output unit
pub const OUTPUT_PADDING: usize = 8;
