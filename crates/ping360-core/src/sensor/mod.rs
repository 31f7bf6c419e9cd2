//! Ping360 sensor driver
//!
//! - [`Ping360`]: the protocol state machine, one per connected sonar
//! - [`ScanHead`]: sector sweep stepping
//! - [`BaudDetector`]: automatic baud rate search
//! - [`FrequencyTracker`]: per-message rate accounting

pub mod baud;
mod driver;
pub mod events;
pub mod frequency;
pub mod sector;
pub mod state;

pub use baud::{BaudDetector, ProbeStep, RoundOutcome, DEFAULT_BAUD_RATES, PROBES_PER_ROUND};
pub use driver::{DriverInput, Ping360, SensorCommand, SensorHandle};
pub use events::{DriverState, SensorEvent};
pub use frequency::{FrequencyTracker, MessageFrequency};
pub use sector::ScanHead;
pub use state::{
    limits, Bounds, DeviceState, TransducerSettings, ANGULAR_RESOLUTION, DEFAULT_SPEED_OF_SOUND,
};
