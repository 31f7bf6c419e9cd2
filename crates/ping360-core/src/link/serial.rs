//! Serial link
//!
//! Port discovery plus the async task that drives a Ping360 over a serial
//! port. A baud rate change is stored and applied when the connection is
//! restarted, which drops the port and opens it again at the new rate.
//! Bytes buffered at the old rate are discarded.

use std::collections::HashMap;
use std::sync::Arc;

use serialport::{SerialPortInfo, SerialPortType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tokio_util::bytes::BytesMut;

use super::{LinkCommand, LinkError, LinkEvent};
use crate::protocol::{ParserStats, PingCodec};

/// USB vendor id of the FTDI bridge found on common sonar USB-serial adapters
pub const FTDI_VENDOR_ID: u16 = 0x0403;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    /// Whether the port sits behind an FTDI USB bridge
    pub fn is_ftdi(&self) -> bool {
        self.vid == Some(FTDI_VENDOR_ID)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb) => (Some(usb.vid), Some(usb.pid), usb.product),
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Sort key: FTDI bridges first, then ttyUSB*, ttyACM*, everything else by name
fn port_sort_key(port: &PortInfo) -> (u8, usize, String) {
    let basename = port.name.rsplit('/').next().unwrap_or(&port.name).to_string();
    let numbered = |prefix: &str| {
        basename
            .strip_prefix(prefix)
            .map(|rest| rest.parse::<usize>().unwrap_or(usize::MAX))
    };

    if port.is_ftdi() {
        return (0, numbered("ttyUSB").unwrap_or(0), basename);
    }
    if let Some(num) = numbered("ttyUSB") {
        return (1, num, basename);
    }
    if let Some(num) = numbered("ttyACM") {
        return (2, num, basename);
    }
    (3, 0, basename)
}

/// List available serial ports, most likely sonar adapters first
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let port = PortInfo::from(info);
        map.entry(port.name.clone()).or_insert(port);
    }

    let mut ports: Vec<PortInfo> = map.into_values().collect();
    ports.sort_by_key(port_sort_key);
    ports
}

/// Open a port at the given rate, 8N1 without flow control
fn open_port(name: &str, baud_rate: u32) -> Result<SerialStream, LinkError> {
    let mut port = tokio_serial::new(name, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()?;

    // Some USB bridges hold the device in reset until DTR is asserted
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::debug!("{name}: failed to set DTR high: {e} (continuing)");
    }

    Ok(port)
}

pub(crate) async fn run(
    name: String,
    mut baud_rate: u32,
    stats: Arc<ParserStats>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut codec = PingCodec::new(stats);
    let mut buf = BytesMut::with_capacity(4096);

    let mut port = match open_port(&name, baud_rate) {
        Ok(port) => port,
        Err(e) => {
            tracing::error!("{name}: {e}");
            let _ = events.send(LinkEvent::Closed);
            return;
        }
    };
    tracing::info!("{name}: opened at {baud_rate} baud");
    let _ = events.send(LinkEvent::Opened);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Write(bytes)) => {
                    if let Err(e) = port.write_all(&bytes).await {
                        tracing::warn!("{name}: write failed: {e}");
                    }
                }
                Some(LinkCommand::SetBaudRate(rate)) => baud_rate = rate,
                Some(LinkCommand::Reconnect) => {
                    match reopen(&name, baud_rate, port, &mut buf) {
                        Some(reopened) => port = reopened,
                        None => break,
                    }
                }
                Some(LinkCommand::Close) | None => break,
            },
            read = port.read_buf(&mut buf) => match read {
                Ok(0) => {
                    tracing::warn!("{name}: port reached end of stream");
                    break;
                }
                Ok(_) => {
                    for packet in codec.decode_all(&mut buf) {
                        if events.send(LinkEvent::Packet(packet)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    tracing::error!("{name}: read failed: {e}");
                    break;
                }
            },
        }
    }

    tracing::info!("{name}: closed");
    let _ = events.send(LinkEvent::Closed);
}

fn reopen(name: &str, baud_rate: u32, port: SerialStream, buf: &mut BytesMut) -> Option<SerialStream> {
    drop(port);
    buf.clear();
    match open_port(name, baud_rate) {
        Ok(port) => {
            tracing::debug!("{name}: reopened at {baud_rate} baud");
            Some(port)
        }
        Err(e) => {
            tracing::error!("{name}: failed to reopen at {baud_rate} baud: {e}");
            None
        }
    }
}
