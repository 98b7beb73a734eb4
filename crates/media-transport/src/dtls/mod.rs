//! DTLS over a shared packet socket
//!
//! This module contains the record classification used to batch handshake
//! flights and the datagram transport adapter handed to the handshake
//! library. The handshake state machine itself is an external collaborator.

pub mod record;
pub mod transport;

pub use record::{ContentType, HandshakeType};
pub use transport::{DatagramConnector, DtlsDatagramTransport, ReceiveTimeout};
