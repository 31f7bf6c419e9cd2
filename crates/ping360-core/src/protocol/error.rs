//! Protocol errors

use thiserror::Error;

/// Errors that can occur while framing or decoding ping messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid start bytes: got {0:02X?}")]
    InvalidHeader([u8; 2]),

    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Incomplete frame: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("Buffer overflow: payload of {0} bytes is too large")]
    BufferOverflow(usize),

    #[error("Payload too short for message {id}: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort {
        id: u16,
        expected: usize,
        actual: usize,
    },

    /// Required by the tokio-util codec traits
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
