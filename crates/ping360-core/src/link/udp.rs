//! UDP link
//!
//! Ethernet-connected Ping360s answer on a fixed UDP port. The socket is
//! connected to the device so only its datagrams are accepted.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::bytes::BytesMut;

use super::{LinkCommand, LinkError, LinkEvent};
use crate::protocol::{ParserStats, PingCodec};

async fn connect(host: &str, port: u16) -> Result<UdpSocket, LinkError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.connect((host, port)).await?;
    // Lets the device learn our address before the first real request
    socket.send(&[]).await?;
    Ok(socket)
}

pub(crate) async fn run(
    host: String,
    port: u16,
    stats: Arc<ParserStats>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let key = format!("{host}:{port}");
    let mut codec = PingCodec::new(stats);
    let mut buf = BytesMut::new();
    let mut datagram = vec![0u8; 65536];

    let mut socket = match connect(&host, port).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("{key}: {e}");
            let _ = events.send(LinkEvent::Closed);
            return;
        }
    };
    tracing::info!("{key}: connected");
    let _ = events.send(LinkEvent::Opened);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Write(bytes)) => {
                    if let Err(e) = socket.send(&bytes).await {
                        tracing::warn!("{key}: send failed: {e}");
                    }
                }
                Some(LinkCommand::SetBaudRate(_)) => {
                    tracing::debug!("{key}: ignoring baud rate change on UDP link");
                }
                Some(LinkCommand::Reconnect) => match connect(&host, port).await {
                    Ok(reconnected) => {
                        socket = reconnected;
                        buf.clear();
                    }
                    Err(e) => {
                        tracing::error!("{key}: reconnect failed: {e}");
                        break;
                    }
                },
                Some(LinkCommand::Close) | None => break,
            },
            received = socket.recv(&mut datagram) => match received {
                Ok(len) => {
                    buf.extend_from_slice(&datagram[..len]);
                    for packet in codec.decode_all(&mut buf) {
                        if events.send(LinkEvent::Packet(packet)).is_err() {
                            return;
                        }
                    }
                }
                // ICMP port unreachable shows up here until the device is listening
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    tracing::debug!("{key}: {e}");
                }
                Err(e) => {
                    tracing::error!("{key}: receive failed: {e}");
                    break;
                }
            },
        }
    }

    tracing::info!("{key}: closed");
    let _ = events.send(LinkEvent::Closed);
}
