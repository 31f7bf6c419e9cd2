//! Device Links
//!
//! A link moves ping frames between the host and one device. Each transport
//! runs in its own task: it owns the I/O handle and the [`PingCodec`], forwards
//! decoded packets upward as [`LinkEvent`]s, and executes [`LinkCommand`]s in
//! the order they were queued. Because a baud switch is just another queued
//! command, nothing written after it can reach the wire before it completes.
//!
//! [`PingCodec`]: crate::protocol::PingCodec

mod configuration;
mod error;
mod file;
pub mod serial;
mod simulation;
mod udp;

pub use configuration::{LinkConfigError, LinkConfiguration, LinkType, PingDeviceType};
pub use error::LinkError;
pub use serial::{list_ports, PortInfo};
pub use simulation::SimulatedPing360;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::{Packet, ParserCounters, ParserStats};

/// Notification from a link task to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The transport is up and frames can be exchanged
    Opened,
    /// A frame passed framing and checksum validation
    Packet(Packet),
    /// The transport went away; no further events follow
    Closed,
}

/// Work queued to a link task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Write(Vec<u8>),
    SetBaudRate(u32),
    Reconnect,
    Close,
}

/// Outcome of a baud rate change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudSwitch {
    /// Stored; used from the next connection restart on
    Applied,
    /// The link has no notion of a baud rate
    NotApplicable,
}

/// Control surface the driver needs from a link
pub trait Link: Send {
    /// Transport kind
    fn link_type(&self) -> LinkType;

    /// Queue a frame for transmission; the checksum is regenerated on encode
    fn write_packet(&mut self, packet: &Packet) -> Result<(), LinkError>;

    /// Change the link speed used by the next [`Link::start_connection`]
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<BaudSwitch, LinkError>;

    /// Restart the underlying connection, reopening serial ports at the current rate
    fn start_connection(&mut self) -> Result<(), LinkError>;

    /// Parser counters of the codec feeding this link
    fn counters(&self) -> ParserCounters;
}

/// Handle to a running link task
#[derive(Debug, Clone)]
pub struct LinkHandle {
    link_type: LinkType,
    commands: mpsc::UnboundedSender<LinkCommand>,
    stats: Arc<ParserStats>,
}

impl LinkHandle {
    pub(crate) fn new(
        link_type: LinkType,
        commands: mpsc::UnboundedSender<LinkCommand>,
        stats: Arc<ParserStats>,
    ) -> Self {
        Self {
            link_type,
            commands,
            stats,
        }
    }

    fn send(&self, command: LinkCommand) -> Result<(), LinkError> {
        self.commands.send(command).map_err(|_| LinkError::Closed)
    }

    /// Ask the link task to shut down
    pub fn close(&self) -> Result<(), LinkError> {
        self.send(LinkCommand::Close)
    }
}

impl Link for LinkHandle {
    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<(), LinkError> {
        self.send(LinkCommand::Write(packet.to_bytes()))
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<BaudSwitch, LinkError> {
        if self.link_type != LinkType::Serial {
            return Ok(BaudSwitch::NotApplicable);
        }
        self.send(LinkCommand::SetBaudRate(baud_rate))?;
        Ok(BaudSwitch::Applied)
    }

    fn start_connection(&mut self) -> Result<(), LinkError> {
        self.send(LinkCommand::Reconnect)
    }

    fn counters(&self) -> ParserCounters {
        self.stats.snapshot()
    }
}

/// Validate a configuration and spawn the matching link task
///
/// Nothing is spawned when the configuration is invalid. Must be called from
/// within a tokio runtime.
pub fn open_link(
    config: &LinkConfiguration,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> Result<LinkHandle, LinkError> {
    config.validate()?;

    let stats = ParserStats::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = LinkHandle::new(config.link_type(), tx, stats.clone());

    match config.link_type() {
        LinkType::Serial => {
            // validate() guarantees both arguments
            let port = config.serial_port().unwrap_or_default().to_string();
            let baud = config.serial_baud_rate().unwrap_or_default();
            tokio::spawn(serial::run(port, baud, stats, rx, events));
        }
        LinkType::Udp => {
            let host = config.udp_host().unwrap_or_default().to_string();
            let port = config.udp_port().unwrap_or_default();
            tokio::spawn(udp::run(host, port, stats, rx, events));
        }
        LinkType::File => {
            let path = config.file_path().unwrap_or_default().into();
            tokio::spawn(file::run(path, stats, rx, events));
        }
        LinkType::Ping360Simulation => {
            tokio::spawn(simulation::run(SimulatedPing360::new(), stats, rx, events));
        }
        other => return Err(LinkError::Unsupported(other)),
    }

    Ok(handle)
}
