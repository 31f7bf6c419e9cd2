//! Packet encoding/decoding
//!
//! Frame format (ping protocol v1, all fields little-endian):
//! - 2 bytes: start bytes `B` `R`
//! - 2 bytes: payload length
//! - 2 bytes: message id
//! - 1 byte: source device id
//! - 1 byte: destination device id
//! - N bytes: payload
//! - 2 bytes: checksum (wrapping sum of every preceding byte)

use byteorder::{ByteOrder, LittleEndian};

use super::{ProtocolError, CHECKSUM_LEN, HEADER_LEN, HOST_DEVICE_ID, MAX_PAYLOAD_SIZE, START_BYTES};

/// A framed ping protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Message id
    pub message_id: u16,
    /// Sender device id
    pub src_device_id: u8,
    /// Receiver device id
    pub dst_device_id: u8,
    /// Message payload
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a new host-originated packet
    pub fn new(message_id: u16, payload: Vec<u8>) -> Self {
        Self {
            message_id,
            src_device_id: HOST_DEVICE_ID,
            dst_device_id: 0,
            payload,
        }
    }

    /// Decode a single complete frame
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(ProtocolError::Incomplete {
                needed: HEADER_LEN + CHECKSUM_LEN,
                available: data.len(),
            });
        }

        if data[0..2] != START_BYTES {
            return Err(ProtocolError::InvalidHeader([data[0], data[1]]));
        }

        let length = LittleEndian::read_u16(&data[2..4]) as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::BufferOverflow(length));
        }

        let total = HEADER_LEN + length + CHECKSUM_LEN;
        if data.len() < total {
            return Err(ProtocolError::Incomplete {
                needed: total,
                available: data.len(),
            });
        }

        let expected = checksum(&data[..HEADER_LEN + length]);
        let actual = LittleEndian::read_u16(&data[HEADER_LEN + length..total]);
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            message_id: LittleEndian::read_u16(&data[4..6]),
            src_device_id: data[6],
            dst_device_id: data[7],
            payload: data[HEADER_LEN..HEADER_LEN + length].to_vec(),
        })
    }

    /// Encode the packet, regenerating the checksum from the current fields
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.extend_from_slice(&START_BYTES);

        let mut word = [0u8; 2];
        LittleEndian::write_u16(&mut word, self.payload.len() as u16);
        bytes.extend_from_slice(&word);
        LittleEndian::write_u16(&mut word, self.message_id);
        bytes.extend_from_slice(&word);
        bytes.push(self.src_device_id);
        bytes.push(self.dst_device_id);
        bytes.extend_from_slice(&self.payload);

        LittleEndian::write_u16(&mut word, checksum(&bytes));
        bytes.extend_from_slice(&word);
        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        HEADER_LEN + self.payload.len() + CHECKSUM_LEN
    }
}

/// Builder for packet payloads
pub struct PacketBuilder {
    message_id: u16,
    src_device_id: u8,
    payload: Vec<u8>,
}

impl PacketBuilder {
    /// Start a payload for the given message id
    pub fn new(message_id: u16) -> Self {
        Self {
            message_id,
            src_device_id: HOST_DEVICE_ID,
            payload: Vec::new(),
        }
    }

    /// Override the source device id (used by the simulated device)
    pub fn source(mut self, src_device_id: u8) -> Self {
        self.src_device_id = src_device_id;
        self
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.payload.push(b);
        self
    }

    /// Add a 16-bit value (little-endian)
    pub fn u16_le(mut self, value: u16) -> Self {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.payload.extend_from_slice(data);
        self
    }

    /// Build the packet
    pub fn build(self) -> Packet {
        Packet {
            message_id: self.message_id,
            src_device_id: self.src_device_id,
            dst_device_id: 0,
            payload: self.payload,
        }
    }
}

/// Wrapping 16-bit sum of all bytes
pub(crate) fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}
