//! RTCP packet support
//!
//! Only the feedback message family (RTPFB/PSFB) lives here; sender and
//! receiver reports are handled by the media stack upstream of this crate.

pub mod feedback;

pub use feedback::{
    is_payload_specific_feedback, is_transport_feedback, RtcpFeedback, RtcpFeedbackType, FMT_FIR,
    FMT_GENERIC_NACK, FMT_PLI,
};
