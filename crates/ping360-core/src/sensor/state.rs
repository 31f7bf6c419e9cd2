//! Device state
//!
//! Everything the driver knows about one connected Ping360: scan head
//! position, transducer settings and the most recent profile.

use serde::{Deserialize, Serialize};

use super::sector::ScanHead;
use crate::protocol::{DeviceData, DeviceInformation, TransducerControl};

/// Grad units in a full mechanical rotation
pub const ANGULAR_RESOLUTION: u16 = 400;

/// Duration of one sample period tick in seconds
pub const SAMPLE_PERIOD_TICK: f64 = 25e-9;

/// Default speed of sound in water, m/s
pub const DEFAULT_SPEED_OF_SOUND: f64 = 1500.0;

/// Inclusive range and default for one setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
    pub default: T,
}

impl<T: Ord + Copy> Bounds<T> {
    pub fn clamp(&self, value: T) -> T {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Firmware limits, with the defaults this driver operates with
pub mod limits {
    use super::{Bounds, ANGULAR_RESOLUTION};

    pub const GAIN_SETTING: Bounds<u8> = Bounds { min: 0, max: 2, default: 0 };
    /// Microseconds
    pub const TRANSMIT_DURATION: Bounds<u16> = Bounds { min: 5, max: 500, default: 32 };
    /// 25 ns ticks
    pub const SAMPLE_PERIOD: Bounds<u16> = Bounds { min: 80, max: 40000, default: 80 };
    /// kHz
    pub const TRANSMIT_FREQUENCY: Bounds<u16> = Bounds { min: 500, max: 1000, default: 750 };
    pub const NUMBER_OF_POINTS: Bounds<u16> = Bounds { min: 1, max: 1200, default: 1200 };
    pub const SECTOR_SIZE: Bounds<u16> = Bounds {
        min: 1,
        max: ANGULAR_RESOLUTION,
        default: ANGULAR_RESOLUTION,
    };
    pub const ANGULAR_SPEED: Bounds<u16> = Bounds { min: 1, max: ANGULAR_RESOLUTION / 2, default: 1 };
}

/// Values the firmware loads at power-on
pub mod boot_defaults {
    pub const GAIN_SETTING: u8 = 0;
    pub const ANGLE: u16 = 0;
    pub const TRANSMIT_DURATION: u16 = 32;
    pub const SAMPLE_PERIOD: u16 = 80;
    pub const TRANSMIT_FREQUENCY: u16 = 740;
    pub const NUMBER_OF_POINTS: u16 = 1024;
}

/// Transducer parameters sent with every profile request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransducerSettings {
    pub gain_setting: u8,
    pub transmit_duration: u16,
    pub sample_period: u16,
    pub transmit_frequency: u16,
    pub number_of_points: u16,
}

impl Default for TransducerSettings {
    fn default() -> Self {
        Self {
            gain_setting: limits::GAIN_SETTING.default,
            transmit_duration: limits::TRANSMIT_DURATION.default,
            sample_period: limits::SAMPLE_PERIOD.default,
            transmit_frequency: limits::TRANSMIT_FREQUENCY.default,
            number_of_points: limits::NUMBER_OF_POINTS.default,
        }
    }
}

/// Per-device state owned by the driver
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub head: ScanHead,
    pub settings: TransducerSettings,
    /// Latest profile, normalised to [0, 1]
    pub samples: Vec<f64>,
    /// Profiles accepted since the driver started
    pub ping_number: u64,
    /// Baud rate detection in progress
    pub configuring: bool,
    /// m/s
    pub speed_of_sound: f64,
    pub device_information: Option<DeviceInformation>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            head: ScanHead::default(),
            settings: TransducerSettings::default(),
            samples: vec![0.0; limits::NUMBER_OF_POINTS.max as usize],
            ping_number: 0,
            configuring: false,
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
            device_information: None,
        }
    }
}

impl DeviceState {
    pub fn angle(&self) -> u16 {
        self.head.angle
    }

    /// Maximum range in metres for the current sample period and point count
    pub fn range(&self) -> f64 {
        self.settings.sample_period as f64
            * SAMPLE_PERIOD_TICK
            * self.settings.number_of_points as f64
            * self.speed_of_sound
            / 2.0
    }

    /// Store an incoming profile; returns the number of samples kept
    pub fn apply_profile(&mut self, data: &DeviceData) -> usize {
        let raw = data.samples();
        self.samples.clear();
        self.samples.extend(raw.iter().map(|&b| b as f64 / 255.0));
        self.head.angle = data.angle % ANGULAR_RESOLUTION;
        raw.len()
    }

    /// Whether a profile at the current angle should be pushed to consumers
    ///
    /// Full-circle scans always refresh; sector scans refresh only while the
    /// head is within half a sector of bearing zero.
    pub fn refreshes_view(&self) -> bool {
        let sector = self.head.sector_size;
        let angle = self.head.angle;
        sector == ANGULAR_RESOLUTION
            || angle >= ANGULAR_RESOLUTION - sector / 2
            || angle <= sector / 2
    }

    /// Transmit request at the current head angle
    pub fn transducer_request(&self) -> TransducerControl {
        TransducerControl {
            mode: 1,
            gain_setting: self.settings.gain_setting,
            angle: self.head.angle,
            transmit_duration: self.settings.transmit_duration,
            sample_period: self.settings.sample_period,
            transmit_frequency: self.settings.transmit_frequency,
            number_of_samples: self.settings.number_of_points,
            transmit: true,
        }
    }
}
