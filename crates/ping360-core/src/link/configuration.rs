//! Link configuration
//!
//! Describes which transport to open and with which arguments. Validation
//! reports the first rule a configuration breaks so callers can fail before
//! anything is attempted against a device.

use std::fmt;
use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::str::FromStr;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkType {
    #[default]
    None,
    File,
    Serial,
    Udp,
    Ping1DSimulation,
    Ping360Simulation,
}

impl LinkType {
    /// Numeric id used by the stream and full string forms
    pub const fn id(self) -> u32 {
        match self {
            LinkType::None => 0,
            LinkType::File => 1,
            LinkType::Serial => 2,
            LinkType::Udp => 3,
            LinkType::Ping1DSimulation => 4,
            LinkType::Ping360Simulation => 5,
        }
    }

    /// Decode a numeric id
    pub fn from_id(id: u32) -> Result<Self, LinkConfigError> {
        Ok(match id {
            0 => LinkType::None,
            1 => LinkType::File,
            2 => LinkType::Serial,
            3 => LinkType::Udp,
            4 => LinkType::Ping1DSimulation,
            5 => LinkType::Ping360Simulation,
            other => return Err(LinkConfigError::InvalidType(other)),
        })
    }

    /// Number of arguments this link type takes
    pub const fn arity(self) -> usize {
        match self {
            LinkType::Serial | LinkType::Udp => 2,
            LinkType::File => 1,
            LinkType::None | LinkType::Ping1DSimulation | LinkType::Ping360Simulation => 0,
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkType::None => "None",
            LinkType::File => "File",
            LinkType::Serial => "Serial",
            LinkType::Udp => "UDP",
            LinkType::Ping1DSimulation => "Ping1D Simulation",
            LinkType::Ping360Simulation => "Ping360 Simulation",
        };
        f.write_str(name)
    }
}

/// Kind of sonar expected at the other end of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PingDeviceType {
    #[default]
    Unknown,
    Ping1D,
    Ping360,
}

impl PingDeviceType {
    /// Numeric id, as reported in `DEVICE_INFORMATION`
    pub const fn id(self) -> u32 {
        match self {
            PingDeviceType::Unknown => 0,
            PingDeviceType::Ping1D => 1,
            PingDeviceType::Ping360 => 2,
        }
    }

    /// Decode a numeric id; anything unrecognised is `Unknown`
    pub fn from_id(id: u32) -> Self {
        match id {
            1 => PingDeviceType::Ping1D,
            2 => PingDeviceType::Ping360,
            _ => PingDeviceType::Unknown,
        }
    }
}

/// First rule a [`LinkConfiguration`] violates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkConfigError {
    #[error("Link configuration has no type")]
    NoType,

    #[error("Invalid link type: {0}")]
    InvalidType(u32),

    #[error("Link configuration has no arguments")]
    NoArgs,

    #[error("{link_type} link expects {expected} arguments, got {actual}")]
    InvalidArgsNumber {
        link_type: LinkType,
        expected: usize,
        actual: usize,
    },

    #[error("Argument {0} is empty")]
    ArgsAreEmpty(usize),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid baud rate: {0}")]
    InvalidBaudRate(String),

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

/// Transport selection plus its arguments
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkConfiguration {
    link_type: LinkType,
    args: Vec<String>,
    name: String,
    device_type: PingDeviceType,
}

impl LinkConfiguration {
    /// Create a configuration with an empty name and unknown device
    pub fn new<I, S>(link_type: LinkType, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            link_type,
            args: args.into_iter().map(Into::into).collect(),
            name: String::new(),
            device_type: PingDeviceType::Unknown,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the expected device type
    pub fn with_device_type(mut self, device_type: PingDeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn device_type(&self) -> PingDeviceType {
        self.device_type
    }

    pub fn set_device_type(&mut self, device_type: PingDeviceType) {
        self.device_type = device_type;
    }

    /// Check every rule in order and report the first one broken
    pub fn validate(&self) -> Result<(), LinkConfigError> {
        if self.link_type == LinkType::None {
            return Err(LinkConfigError::NoType);
        }

        let expected = self.link_type.arity();
        if expected > 0 && self.args.is_empty() {
            return Err(LinkConfigError::NoArgs);
        }

        if self.args.len() != expected {
            return Err(LinkConfigError::InvalidArgsNumber {
                link_type: self.link_type,
                expected,
                actual: self.args.len(),
            });
        }

        if let Some(index) = self.args.iter().position(|arg| arg.is_empty()) {
            return Err(LinkConfigError::ArgsAreEmpty(index));
        }

        match self.link_type {
            LinkType::Udp => {
                if !is_valid_host(&self.args[0]) {
                    return Err(LinkConfigError::InvalidUrl(self.args[0].clone()));
                }
                if self.args[1].parse::<u16>().is_err() {
                    return Err(LinkConfigError::InvalidUrl(self.args.join(":")));
                }
            }
            LinkType::Serial => {
                if !matches!(self.args[1].parse::<u32>(), Ok(baud) if baud > 0) {
                    return Err(LinkConfigError::InvalidBaudRate(self.args[1].clone()));
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Serial device path
    pub fn serial_port(&self) -> Option<&str> {
        self.arg_for(LinkType::Serial, 0)
    }

    /// Serial baud rate
    pub fn serial_baud_rate(&self) -> Option<u32> {
        self.arg_for(LinkType::Serial, 1)?.parse().ok()
    }

    /// UDP host name or address
    pub fn udp_host(&self) -> Option<&str> {
        self.arg_for(LinkType::Udp, 0)
    }

    /// UDP port
    pub fn udp_port(&self) -> Option<u16> {
        self.arg_for(LinkType::Udp, 1)?.parse().ok()
    }

    /// Path of a recorded capture
    pub fn file_path(&self) -> Option<&str> {
        self.arg_for(LinkType::File, 0)
    }

    fn arg_for(&self, link_type: LinkType, index: usize) -> Option<&str> {
        if self.link_type != link_type {
            return None;
        }
        self.args.get(index).map(String::as_str)
    }

    /// Arguments joined with `:`
    pub fn conf_string(&self) -> String {
        self.args.join(":")
    }

    /// Type id and name followed by the arguments, joined with `:`
    pub fn full_conf_string(&self) -> String {
        self.full_conf_string_list().join(":")
    }

    pub fn full_conf_string_list(&self) -> Vec<String> {
        let mut list = Vec::with_capacity(self.args.len() + 2);
        list.push(self.link_type.id().to_string());
        list.push(self.name.clone());
        list.extend(self.args.iter().cloned());
        list
    }

    /// Write the binary stream form
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_u32::<BigEndian>(self.args.len() as u32)?;
        for arg in &self.args {
            write_string(out, arg)?;
        }
        write_string(out, &self.name)?;
        out.write_u32::<BigEndian>(self.link_type.id())?;
        out.write_u32::<BigEndian>(self.device_type.id())?;
        Ok(())
    }

    /// Read the binary stream form written by [`write_to`](Self::write_to)
    pub fn read_from<R: Read>(input: &mut R) -> Result<Self, LinkConfigError> {
        let count = input.read_u32::<BigEndian>().map_err(malformed)?;
        let args = (0..count)
            .map(|_| read_string(input))
            .collect::<Result<Vec<_>, _>>()?;
        let name = read_string(input)?;
        let link_type = LinkType::from_id(input.read_u32::<BigEndian>().map_err(malformed)?)?;
        let device_type = PingDeviceType::from_id(input.read_u32::<BigEndian>().map_err(malformed)?);

        Ok(Self {
            link_type,
            args,
            name,
            device_type,
        })
    }
}

impl fmt::Display for LinkConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.link_type, self.conf_string())?;
        if !self.name.is_empty() {
            write!(f, " \"{}\"", self.name)?;
        }
        Ok(())
    }
}

impl FromStr for LinkConfiguration {
    type Err = LinkConfigError;

    /// Parse the [`full_conf_string`](LinkConfiguration::full_conf_string) form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let type_id = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(LinkConfigError::NoType)?
            .parse::<u32>()
            .map_err(|_| LinkConfigError::Malformed(s.to_string()))?;
        let link_type = LinkType::from_id(type_id)?;
        let name = parts.next().unwrap_or_default().to_string();
        let args: Vec<String> = parts.map(str::to_string).collect();

        Ok(Self {
            link_type,
            args,
            name,
            device_type: PingDeviceType::Unknown,
        })
    }
}

/// IPv4 address or DNS name; IPv6 literals cannot survive the `:` joined string form
fn is_valid_host(host: &str) -> bool {
    if host.parse::<Ipv4Addr>().is_ok() {
        return true;
    }
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn write_string<W: Write>(out: &mut W, s: &str) -> std::io::Result<()> {
    out.write_u32::<BigEndian>(s.len() as u32)?;
    out.write_all(s.as_bytes())
}

fn read_string<R: Read>(input: &mut R) -> Result<String, LinkConfigError> {
    let len = input.read_u32::<BigEndian>().map_err(malformed)? as usize;
    // The prefix is untrusted, so only bytes actually present are buffered
    let mut buf = Vec::new();
    input
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(malformed)?;
    if buf.len() != len {
        return Err(LinkConfigError::Malformed(format!(
            "string of {len} bytes truncated to {}",
            buf.len()
        )));
    }
    String::from_utf8(buf).map_err(|e| LinkConfigError::Malformed(e.to_string()))
}

fn malformed(e: std::io::Error) -> LinkConfigError {
    LinkConfigError::Malformed(e.to_string())
}
