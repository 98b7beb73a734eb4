//! DTLS record classification
//!
//! The transport adapter only looks at the outside of a record: its content
//! type, and for handshake records the message type, which decides whether
//! the record ends the current flight. Everything else is opaque to it.

/// Length of the DTLS record header preceding the fragment
pub const DTLS_RECORD_HEADER_LEN: usize = 13;

/// Largest RTP payload the shared socket is expected to carry
pub const MAX_RTP_PAYLOAD_LEN: usize = 1280;

/// Datagram size advertised to the handshake library in both directions
pub const DATAGRAM_LIMIT: usize = DTLS_RECORD_HEADER_LEN + MAX_RTP_PAYLOAD_LEN;

/// DTLS record content type (first byte of every record)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    /// Change cipher spec record, part of a handshake flight
    ChangeCipherSpec = 20,

    /// Alert record, sent outside of flight batching
    Alert = 21,

    /// Handshake record
    Handshake = 22,

    /// Application data record, sent outside of flight batching
    ApplicationData = 23,

    /// Unrecognized content type
    Invalid = 255,
}

impl From<u8> for ContentType {
    fn from(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Invalid,
        }
    }
}

/// DTLS handshake message type (first fragment byte of a handshake record)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    /// Hello request
    HelloRequest = 0,

    /// Client hello
    ClientHello = 1,

    /// Server hello
    ServerHello = 2,

    /// Hello verify request (DTLS cookie exchange)
    HelloVerifyRequest = 3,

    /// Certificate
    Certificate = 11,

    /// Server key exchange
    ServerKeyExchange = 12,

    /// Certificate request
    CertificateRequest = 13,

    /// Server hello done
    ServerHelloDone = 14,

    /// Certificate verify
    CertificateVerify = 15,

    /// Client key exchange
    ClientKeyExchange = 16,

    /// Finished
    Finished = 20,

    /// Unrecognized handshake message type
    Invalid = 255,
}

impl From<u8> for HandshakeType {
    fn from(value: u8) -> Self {
        match value {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            3 => HandshakeType::HelloVerifyRequest,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            _ => HandshakeType::Invalid,
        }
    }
}

impl HandshakeType {
    /// Whether a record carrying this message ends the current flight
    ///
    /// Flight-terminal messages are the last ones a peer sends before it
    /// awaits a response, so the accumulated flight is flushed right after
    /// they are appended. Unrecognized messages are treated as terminal so a
    /// flight can never get stuck; the caller logs the unknown type byte.
    pub fn ends_flight(&self) -> bool {
        matches!(
            self,
            HandshakeType::HelloRequest
                | HandshakeType::ClientHello
                | HandshakeType::HelloVerifyRequest
                | HandshakeType::ServerHelloDone
                | HandshakeType::Finished
                | HandshakeType::Invalid
        )
    }
}
