//! File replay link
//!
//! Replays a raw capture of ping frames through the codec, as if they had
//! arrived from a device, then closes. Writes are discarded.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::bytes::BytesMut;

use super::{LinkCommand, LinkEvent};
use crate::protocol::{ParserStats, PingCodec};

pub(crate) async fn run(
    path: PathBuf,
    stats: Arc<ParserStats>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("{}: {e}", path.display());
            let _ = events.send(LinkEvent::Closed);
            return;
        }
    };
    let _ = events.send(LinkEvent::Opened);

    let mut codec = PingCodec::new(stats);
    let mut buf = BytesMut::from(&bytes[..]);
    let packets = codec.decode_all(&mut buf);
    tracing::info!("{}: replaying {} frames", path.display(), packets.len());

    for packet in packets {
        // Drain anything the driver queued so a Close stops the replay early
        while let Ok(command) = commands.try_recv() {
            if command == LinkCommand::Close {
                let _ = events.send(LinkEvent::Closed);
                return;
            }
        }
        if events.send(LinkEvent::Packet(packet)).is_err() {
            return;
        }
        tokio::task::yield_now().await;
    }

    let _ = events.send(LinkEvent::Closed);
}
