//! Streaming frame codec
//!
//! Splits a raw byte stream into [`Packet`]s, resynchronising on the `BR`
//! start bytes after any corrupt frame. Every accepted frame and every
//! rejected frame is counted in a shared [`ParserStats`], which the baud rate
//! detector reads to score a candidate rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Packet, ProtocolError, CHECKSUM_LEN, HEADER_LEN, MAX_PAYLOAD_SIZE, START_BYTES};

/// Parser counters shared between the link task and the driver
#[derive(Debug, Default)]
pub struct ParserStats {
    parsed: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`ParserStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserCounters {
    /// Frames that decoded successfully
    pub parsed: u64,
    /// Frames rejected for a bad length or checksum
    pub errors: u64,
}

impl ParserStats {
    /// Create a new shared counter set
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take a snapshot of both counters
    pub fn snapshot(&self) -> ParserCounters {
        ParserCounters {
            parsed: self.parsed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn record_parsed(&self) {
        self.parsed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Ping protocol codec for use with tokio-util framing
#[derive(Debug, Clone)]
pub struct PingCodec {
    stats: Arc<ParserStats>,
}

impl Default for PingCodec {
    fn default() -> Self {
        Self::new(ParserStats::new())
    }
}

impl PingCodec {
    /// Create a codec that reports into the given counters
    pub fn new(stats: Arc<ParserStats>) -> Self {
        Self { stats }
    }

    /// Shared counters of this codec
    pub fn stats(&self) -> &Arc<ParserStats> {
        &self.stats
    }

    /// Decode every complete frame currently buffered
    pub fn decode_all(&mut self, src: &mut BytesMut) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(Some(packet)) = self.decode(src) {
            packets.push(packet);
        }
        packets
    }
}

impl Decoder for PingCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
        loop {
            match src.windows(2).position(|w| w == START_BYTES) {
                Some(0) => {}
                Some(skip) => src.advance(skip),
                None => {
                    // A trailing 'B' may be the first half of the next start marker
                    let keep = usize::from(src.last() == Some(&START_BYTES[0]));
                    let discard = src.len() - keep;
                    src.advance(discard);
                    return Ok(None);
                }
            }

            if src.len() < HEADER_LEN {
                return Ok(None);
            }

            let length = LittleEndian::read_u16(&src[2..4]) as usize;
            if length > MAX_PAYLOAD_SIZE {
                tracing::debug!("Dropping frame with oversized payload ({length} bytes)");
                self.stats.record_error();
                src.advance(1);
                continue;
            }

            let total = HEADER_LEN + length + CHECKSUM_LEN;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            match Packet::from_bytes(&src[..total]) {
                Ok(packet) => {
                    src.advance(total);
                    self.stats.record_parsed();
                    return Ok(Some(packet));
                }
                Err(e) => {
                    tracing::debug!("Dropping corrupt frame: {e}");
                    self.stats.record_error();
                    src.advance(1);
                }
            }
        }
    }
}

impl Encoder<Packet> for PingCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.extend_from_slice(&item.to_bytes());
        Ok(())
    }
}

impl<'a> Encoder<&'a Packet> for PingCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &'a Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.extend_from_slice(&item.to_bytes());
        Ok(())
    }
}
