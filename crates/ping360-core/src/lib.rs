//! # Ping360 Core Library
//!
//! Protocol driver for the Blue Robotics Ping360 scanning sonar.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Ping protocol framing, checksums and typed messages
//! - Serial, UDP, file replay and simulated device links
//! - Automatic serial baud rate detection
//! - Sector scanning with a closed request/response acquisition loop
//!
//! ## Example
//!
//! ```rust,ignore
//! use ping360_core::prelude::*;
//!
//! let link = LinkConfiguration::new(LinkType::Serial, ["/dev/ttyUSB0", "115200"]);
//! let mut sensor = Ping360::connect(&link, DriverConfig::default())?;
//! let mut events = sensor.subscribe();
//!
//! while let Ok(event) = events.recv().await {
//!     if let SensorEvent::DataChanged { angle, samples, .. } = event {
//!         println!("{angle}: {} samples", samples.len());
//!     }
//! }
//! ```

pub mod config;
pub mod link;
pub mod protocol;
pub mod sensor;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, DriverConfig};
    pub use crate::link::{
        list_ports, open_link, BaudSwitch, Link, LinkConfigError, LinkConfiguration, LinkError,
        LinkEvent, LinkHandle, LinkType, PingDeviceType,
    };
    pub use crate::protocol::{Message, MessageId, Packet, PingCodec, ProtocolError};
    pub use crate::sensor::{
        DriverState, Ping360, SensorCommand, SensorEvent, SensorHandle, ANGULAR_RESOLUTION,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
