//! Ping Protocol Communication
//!
//! Implements the Blue Robotics "ping" binary protocol used by the Ping360.
//!
//! Every frame starts with the `BR` start bytes, carries a little-endian
//! header with the payload length and message id, and ends with a 16-bit
//! additive checksum over everything before it.

mod codec;
mod error;
pub mod messages;
mod packet;

pub use codec::{ParserCounters, ParserStats, PingCodec};
pub use error::ProtocolError;
pub use messages::{
    general_request, DeviceData, DeviceInformation, Message, MessageId, Nack, TransducerControl,
};
pub use packet::{Packet, PacketBuilder};

/// Start bytes of every frame
pub const START_BYTES: [u8; 2] = [b'B', b'R'];

/// Header length: start bytes, payload length, message id, source and destination ids
pub const HEADER_LEN: usize = 8;

/// Trailing checksum length
pub const CHECKSUM_LEN: usize = 2;

/// Largest payload the codec accepts before treating the frame as garbage
pub const MAX_PAYLOAD_SIZE: usize = 8192;

/// Device id used by the host side of the link
pub const HOST_DEVICE_ID: u8 = 0;
