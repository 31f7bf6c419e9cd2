//! Notifications published by the driver

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::protocol::DeviceInformation;

/// Driver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// No link, or the link closed
    #[default]
    Disconnected,
    /// Searching for a working baud rate
    Configuring,
    /// Requesting and receiving profiles
    Acquiring,
}

/// Change notification sent to every subscriber
///
/// Setters only publish when the stored value actually changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SensorEvent {
    AngleChanged { angle: u16 },
    /// A profile was accepted and the view should refresh
    DataChanged {
        angle: u16,
        ping_number: u64,
        /// Normalised to [0, 1]
        samples: Arc<[f64]>,
    },
    GainSettingChanged { gain_setting: u8 },
    TransmitDurationChanged { transmit_duration: u16 },
    SamplePeriodChanged { sample_period: u16 },
    TransmitFrequencyChanged { transmit_frequency: u16 },
    NumberOfPointsChanged { number_of_points: u16 },
    /// Metres
    RangeChanged { range: f64 },
    SectorSizeChanged { sector_size: u16 },
    AngularSpeedChanged { angular_speed: u16 },
    ReverseDirectionChanged { reverse_direction: bool },
    SpeedOfSoundChanged { speed_of_sound: f64 },
    /// Smoothed arrival rate of every message id seen so far, in Hz
    MessageFrequencyUpdated { frequencies: HashMap<u16, f64> },
    MessageParsed { id: u16 },
    LinkUpdated,
    DeviceInformation { info: DeviceInformation },
    BaudRateCommitted { baud_rate: u32 },
    StateChanged { state: DriverState },
}
