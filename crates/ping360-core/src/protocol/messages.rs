//! Typed ping messages
//!
//! Only the subset of the ping360 command set needed to identify the device,
//! acquire profiles, recover from transducer NACKs and probe baud rates.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{Packet, PacketBuilder, ProtocolError};

/// Message ids understood by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    /// Common: acknowledge
    Ack,
    /// Common: negative acknowledge
    Nack,
    /// Common: free text from the device
    AsciiText,
    /// Common: device identification
    DeviceInformation,
    /// Common: protocol version
    ProtocolVersion,
    /// Common: request that the device send another message
    GeneralRequest,
    /// Ping360: one profile at one bearing
    DeviceData,
    /// Ping360: transducer control and transmit command
    Transducer,
}

impl MessageId {
    /// Numeric id on the wire
    pub const fn id(self) -> u16 {
        match self {
            MessageId::Ack => 1,
            MessageId::Nack => 2,
            MessageId::AsciiText => 3,
            MessageId::DeviceInformation => 4,
            MessageId::ProtocolVersion => 5,
            MessageId::GeneralRequest => 6,
            MessageId::DeviceData => 2300,
            MessageId::Transducer => 2601,
        }
    }

    /// Look up a wire id
    pub fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            1 => MessageId::Ack,
            2 => MessageId::Nack,
            3 => MessageId::AsciiText,
            4 => MessageId::DeviceInformation,
            5 => MessageId::ProtocolVersion,
            6 => MessageId::GeneralRequest,
            2300 => MessageId::DeviceData,
            2601 => MessageId::Transducer,
            _ => return None,
        })
    }
}

/// Decoded message, one variant per message kind
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ack { acked_id: u16 },
    Nack(Nack),
    AsciiText(String),
    DeviceInformation(DeviceInformation),
    ProtocolVersion { major: u8, minor: u8, patch: u8 },
    GeneralRequest { requested_id: u16 },
    DeviceData(DeviceData),
    Transducer(TransducerControl),
    /// Frame with an id outside the supported subset
    Unknown { id: u16 },
}

impl Message {
    /// Decode the payload of a framed packet
    pub fn decode(packet: &Packet) -> Result<Self, ProtocolError> {
        let mut r = PayloadReader::new(packet);
        let Some(kind) = MessageId::from_id(packet.message_id) else {
            return Ok(Message::Unknown {
                id: packet.message_id,
            });
        };

        let message = match kind {
            MessageId::Ack => Message::Ack {
                acked_id: r.u16()?,
            },
            MessageId::Nack => Message::Nack(Nack {
                nacked_id: r.u16()?,
                message: r.text(),
            }),
            MessageId::AsciiText => Message::AsciiText(r.text()),
            MessageId::DeviceInformation => Message::DeviceInformation(DeviceInformation {
                device_type: r.u8()?,
                device_revision: r.u8()?,
                firmware_version_major: r.u8()?,
                firmware_version_minor: r.u8()?,
                firmware_version_patch: r.u8()?,
            }),
            MessageId::ProtocolVersion => Message::ProtocolVersion {
                major: r.u8()?,
                minor: r.u8()?,
                patch: r.u8()?,
            },
            MessageId::GeneralRequest => Message::GeneralRequest {
                requested_id: r.u16()?,
            },
            MessageId::DeviceData => {
                let mode = r.u8()?;
                let gain_setting = r.u8()?;
                let angle = r.u16()?;
                let transmit_duration = r.u16()?;
                let sample_period = r.u16()?;
                let transmit_frequency = r.u16()?;
                let number_of_samples = r.u16()?;
                let data_length = r.u16()?;
                Message::DeviceData(DeviceData {
                    mode,
                    gain_setting,
                    angle,
                    transmit_duration,
                    sample_period,
                    transmit_frequency,
                    number_of_samples,
                    data_length,
                    data: r.rest().to_vec(),
                })
            }
            MessageId::Transducer => Message::Transducer(TransducerControl {
                mode: r.u8()?,
                gain_setting: r.u8()?,
                angle: r.u16()?,
                transmit_duration: r.u16()?,
                sample_period: r.u16()?,
                transmit_frequency: r.u16()?,
                number_of_samples: r.u16()?,
                transmit: r.u8()? != 0,
            }),
        };
        Ok(message)
    }

    /// Wire id of this message
    pub fn id(&self) -> u16 {
        match self {
            Message::Ack { .. } => MessageId::Ack.id(),
            Message::Nack(_) => MessageId::Nack.id(),
            Message::AsciiText(_) => MessageId::AsciiText.id(),
            Message::DeviceInformation(_) => MessageId::DeviceInformation.id(),
            Message::ProtocolVersion { .. } => MessageId::ProtocolVersion.id(),
            Message::GeneralRequest { .. } => MessageId::GeneralRequest.id(),
            Message::DeviceData(_) => MessageId::DeviceData.id(),
            Message::Transducer(_) => MessageId::Transducer.id(),
            Message::Unknown { id } => *id,
        }
    }
}

/// Build a `GENERAL_REQUEST` asking the device to send `requested` back
pub fn general_request(requested: MessageId) -> Packet {
    PacketBuilder::new(MessageId::GeneralRequest.id())
        .u16_le(requested.id())
        .build()
}

/// Negative acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    /// Id of the rejected message
    pub nacked_id: u16,
    /// Reason given by the firmware
    pub message: String,
}

impl Nack {
    /// Encode as sent by a device
    pub fn to_packet(&self, src_device_id: u8) -> Packet {
        PacketBuilder::new(MessageId::Nack.id())
            .source(src_device_id)
            .u16_le(self.nacked_id)
            .bytes(self.message.as_bytes())
            .byte(0)
            .build()
    }
}

/// Device identification block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInformation {
    pub device_type: u8,
    pub device_revision: u8,
    pub firmware_version_major: u8,
    pub firmware_version_minor: u8,
    pub firmware_version_patch: u8,
}

impl DeviceInformation {
    /// Encode as sent by a device
    pub fn to_packet(&self, src_device_id: u8) -> Packet {
        PacketBuilder::new(MessageId::DeviceInformation.id())
            .source(src_device_id)
            .byte(self.device_type)
            .byte(self.device_revision)
            .byte(self.firmware_version_major)
            .byte(self.firmware_version_minor)
            .byte(self.firmware_version_patch)
            .byte(0)
            .build()
    }
}

/// One profile: echo intensities along a single bearing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceData {
    pub mode: u8,
    pub gain_setting: u8,
    /// Bearing in grad units
    pub angle: u16,
    pub transmit_duration: u16,
    pub sample_period: u16,
    pub transmit_frequency: u16,
    pub number_of_samples: u16,
    /// Sample count declared by the device
    pub data_length: u16,
    /// Raw 8-bit intensities
    pub data: Vec<u8>,
}

impl DeviceData {
    /// Samples actually present, bounded by both the declared length and the payload
    pub fn samples(&self) -> &[u8] {
        let len = (self.data_length as usize).min(self.data.len());
        &self.data[..len]
    }

    /// Encode as sent by a device
    pub fn to_packet(&self, src_device_id: u8) -> Packet {
        PacketBuilder::new(MessageId::DeviceData.id())
            .source(src_device_id)
            .byte(self.mode)
            .byte(self.gain_setting)
            .u16_le(self.angle)
            .u16_le(self.transmit_duration)
            .u16_le(self.sample_period)
            .u16_le(self.transmit_frequency)
            .u16_le(self.number_of_samples)
            .u16_le(self.data_length)
            .bytes(&self.data)
            .build()
    }
}

/// Transducer control request; with `transmit` set it also triggers a ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransducerControl {
    pub mode: u8,
    pub gain_setting: u8,
    pub angle: u16,
    pub transmit_duration: u16,
    pub sample_period: u16,
    pub transmit_frequency: u16,
    pub number_of_samples: u16,
    pub transmit: bool,
}

impl TransducerControl {
    /// Encode as sent by the host
    pub fn to_packet(&self) -> Packet {
        PacketBuilder::new(MessageId::Transducer.id())
            .byte(self.mode)
            .byte(self.gain_setting)
            .u16_le(self.angle)
            .u16_le(self.transmit_duration)
            .u16_le(self.sample_period)
            .u16_le(self.transmit_frequency)
            .u16_le(self.number_of_samples)
            .byte(u8::from(self.transmit))
            .byte(0)
            .build()
    }
}

/// Little-endian cursor over a packet payload
struct PayloadReader<'a> {
    id: u16,
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(packet: &'a Packet) -> Self {
        Self {
            id: packet.message_id,
            data: &packet.payload,
            pos: 0,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.pos + n > self.data.len() {
            return Err(ProtocolError::PayloadTooShort {
                id: self.id,
                expected: self.pos + n,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Null-terminated (or payload-terminated) text
    fn text(&mut self) -> String {
        let rest = self.rest();
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        String::from_utf8_lossy(&rest[..end]).into_owned()
    }
}
