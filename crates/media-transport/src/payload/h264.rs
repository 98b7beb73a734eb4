//! H.264 RTP depacketizer
//!
//! Reconstructs NAL units from RTP payloads carrying either one complete
//! unit (types 1-23) or FU-A fragments (type 28), and emits them as an
//! Annex-B stream: start code, NAL bytes, and a zeroed lookahead pad for the
//! decoder. Anything malformed is dropped with a diagnostic, never surfaced
//! as an error; damage that loses data flags the keyframe scheduler instead.

use std::sync::Arc;

use tracing::debug;

use crate::RtpSequenceNumber;

use super::keyframe::KeyframeScheduler;
use super::{
    NAL_FU_A, NAL_IDR, NAL_PPS, NAL_SEI, NAL_SPS, NAL_STAP_A, NAL_START_CODE, NAL_TYPE_MASK,
    OUTPUT_PADDING,
};

/// FU header start bit
const FU_START_BIT: u8 = 0x80;

/// FU header end bit
const FU_END_BIT: u8 = 0x40;

/// Forbidden bit of a NAL header; forced on flushed incomplete units
const NAL_FORBIDDEN_BIT: u8 = 0x80;

/// Mask over the forbidden bit and NRI field of a NAL header
const NAL_FORBIDDEN_NRI_MASK: u8 = 0xe0;

/// Depacketizer for a single H.264 RTP stream
///
/// Driven by exactly one thread; both the per-call output buffer and the
/// reassembly buffer are reused across calls, so steady-state operation does
/// not allocate.
pub struct H264Depacketizer {
    /// Annex-B output of the current call, reused across calls
    out: Vec<u8>,

    /// In-progress FU-A reconstruction (start code + synthesized header +
    /// accumulated fragment payloads)
    frag: Vec<u8>,

    /// True strictly between a start-marked and an end-marked fragment
    fragmented_nal: bool,

    last_sequence: Option<RtpSequenceNumber>,
    last_nal_type: u8,

    /// Flush aborted reconstructions with the forbidden bit forced instead
    /// of discarding them
    emit_incomplete: bool,

    scheduler: Option<Arc<KeyframeScheduler>>,
}

impl H264Depacketizer {
    /// Create a depacketizer with no keyframe scheduler attached
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            frag: Vec::new(),
            fragmented_nal: false,
            last_sequence: None,
            last_nal_type: 0,
            emit_incomplete: false,
            scheduler: None,
        }
    }

    /// Attach the keyframe scheduler notified on damage and recovery
    pub fn set_keyframe_scheduler(&mut self, scheduler: Arc<KeyframeScheduler>) {
        self.scheduler = Some(scheduler);
    }

    /// Control whether aborted reconstructions are flushed with the
    /// forbidden bit set (so the decoder rejects them) or discarded
    pub fn set_emit_incomplete(&mut self, emit_incomplete: bool) {
        self.emit_incomplete = emit_incomplete;
    }

    /// Type field of the most recently accepted NAL unit
    pub fn last_nal_type(&self) -> u8 {
        self.last_nal_type
    }

    /// Process one RTP payload
    ///
    /// Returns the Annex-B bytes completed by this packet, or `None` when
    /// more fragments are needed or the payload was dropped. The backing
    /// buffer carries [`OUTPUT_PADDING`] zero bytes beyond the returned
    /// slice for decoder lookahead; the returned bytes are only valid until
    /// the next call.
    pub fn depacketize(&mut self, sequence: RtpSequenceNumber, payload: &[u8]) -> Option<&[u8]> {
        self.out.clear();

        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                debug!(sequence, expected, "sequence gap, resetting reassembly");
                self.abort_fragment();
                if let Some(scheduler) = &self.scheduler {
                    scheduler.keyframe_needed();
                }
            }
        }
        self.last_sequence = Some(sequence);

        if payload.is_empty() {
            debug!("dropping empty rtp payload");
            return self.finish();
        }

        let nal_type = payload[0] & NAL_TYPE_MASK;
        match nal_type {
            1..=23 => {
                if self.fragmented_nal {
                    debug!("single nal unit interrupts fu-a reassembly");
                    self.abort_fragment();
                }
                self.out.extend_from_slice(&NAL_START_CODE);
                self.out.extend_from_slice(payload);
                self.observe(nal_type);
            }
            NAL_FU_A => self.read_fua(payload),
            other => {
                if self.fragmented_nal {
                    debug!("unsupported nal unit type interrupts fu-a reassembly");
                    self.abort_fragment();
                }
                debug!(nal_type = other, "unsupported nal unit type, dropping payload");
            }
        }

        self.finish()
    }

    fn read_fua(&mut self, payload: &[u8]) {
        if payload.len() < 2 {
            debug!("truncated fu-a payload, dropping");
            self.abort_fragment();
            return;
        }

        let indicator = payload[0];
        let header = payload[1];
        let start = header & FU_START_BIT != 0;
        let end = header & FU_END_BIT != 0;
        let nal_type = header & NAL_TYPE_MASK;

        if start && end {
            debug!("fu-a carries both start and end bits, dropping");
            return;
        }

        if start {
            if self.fragmented_nal {
                debug!("fu-a start interrupts reassembly in progress");
                self.abort_fragment();
            }
            self.frag.clear();
            self.frag.extend_from_slice(&NAL_START_CODE);
            // NAL header synthesized from the indicator's forbidden/NRI bits
            // and the original type carried in the FU header.
            self.frag.push((indicator & NAL_FORBIDDEN_NRI_MASK) | nal_type);
            self.frag.extend_from_slice(&payload[2..]);
            self.fragmented_nal = true;
            self.last_nal_type = nal_type;
            // A keyframe-related start fragment only announces the unit;
            // the want flag clears when reassembly actually completes.
            if let Some(scheduler) = &self.scheduler {
                if matches!(nal_type, NAL_IDR | NAL_SPS | NAL_PPS) {
                    scheduler.keyframe_imminent();
                }
            }
            return;
        }

        if !self.fragmented_nal {
            debug!("orphan fu-a continuation, dropping");
            return;
        }

        self.frag.extend_from_slice(&payload[2..]);
        if end {
            self.out.extend_from_slice(&self.frag);
            self.frag.clear();
            self.fragmented_nal = false;
            self.observe(nal_type);
        }
    }

    /// Abort an in-progress reconstruction on every terminal path
    fn abort_fragment(&mut self) {
        if !self.fragmented_nal {
            return;
        }
        self.fragmented_nal = false;

        if self.emit_incomplete && self.frag.len() > NAL_START_CODE.len() {
            // Forbidden bit forced so the decoder rejects the damaged unit.
            self.frag[NAL_START_CODE.len()] |= NAL_FORBIDDEN_BIT;
            debug!(
                len = self.frag.len(),
                "flushing incomplete nal unit with forbidden bit set"
            );
            self.out.extend_from_slice(&self.frag);
        } else {
            debug!(len = self.frag.len(), "discarding incomplete nal unit");
        }
        self.frag.clear();
    }

    fn observe(&mut self, nal_type: u8) {
        if let Some(scheduler) = &self.scheduler {
            match nal_type {
                NAL_IDR => scheduler.keyframe_received(),
                // Parameter sets usually precede an IDR, so hold off on any
                // pending request.
                NAL_SPS | NAL_PPS => scheduler.keyframe_imminent(),
                _ => {}
            }
        }
        self.last_nal_type = nal_type;
    }

    fn finish(&mut self) -> Option<&[u8]> {
        if self.out.is_empty() {
            return None;
        }
        let len = self.out.len();
        self.out.resize(len + OUTPUT_PADDING, 0);
        Some(&self.out[..len])
    }
}

impl Default for H264Depacketizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an RTP payload carries (the start of) a keyframe
///
/// Stateless, usable without running reconstruction: single NAL units and
/// STAP-A aggregates are checked for IDR/SPS/PPS/SEI, FU-A fragments only on
/// their start fragment. A STAP-A whose declared sub-unit lengths do not add
/// up to the payload length is not trusted.
pub fn is_keyframe(payload: &[u8]) -> bool {
    if payload.is_empty() {
        return false;
    }
    match payload[0] & NAL_TYPE_MASK {
        NAL_FU_A => {
            payload.len() >= 2
                && payload[1] & FU_START_BIT != 0
                && payload[1] & NAL_TYPE_MASK == NAL_IDR
        }
        NAL_STAP_A => stap_a_first_type(payload)
            .map(is_keyframe_nal_type)
            .unwrap_or(false),
        nal_type => is_keyframe_nal_type(nal_type),
    }
}

fn is_keyframe_nal_type(nal_type: u8) -> bool {
    matches!(nal_type, NAL_IDR | NAL_SEI | NAL_SPS | NAL_PPS)
}

/// First sub-unit type of a STAP-A payload, after validating that the
/// declared sub-unit lengths exactly cover the aggregate
fn stap_a_first_type(payload: &[u8]) -> Option<u8> {
    let mut offset = 1;
    let mut first = None;
    while offset < payload.len() {
        if payload.len() - offset < 2 {
            return None;
        }
        let len = u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
        offset += 2;
        if len == 0 || payload.len() - offset < len {
            return None;
        }
        if first.is_none() {
            first = Some(payload[offset] & NAL_TYPE_MASK);
        }
        offset += len;
    }
    first
}
