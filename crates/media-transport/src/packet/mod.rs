//! Control packet encoding and decoding

pub mod rtcp;
