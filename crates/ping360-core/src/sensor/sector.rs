//! Sector scan controller
//!
//! Keeps the scan head sweeping back and forth inside a sector centred on
//! bearing zero. All angles are grad units on a circle of
//! [`ANGULAR_RESOLUTION`] steps.

use serde::{Deserialize, Serialize};

use super::state::{limits, ANGULAR_RESOLUTION};

/// Scan head position and sweep policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHead {
    /// Current bearing, always in `[0, ANGULAR_RESOLUTION)`
    pub angle: u16,
    /// Width of the sweep window; `ANGULAR_RESOLUTION` means the full circle
    pub sector_size: u16,
    /// Grad units moved per profile
    pub angular_speed: u16,
    /// Sweeping towards decreasing bearings
    pub reverse_direction: bool,
}

impl Default for ScanHead {
    fn default() -> Self {
        Self {
            angle: 0,
            sector_size: limits::SECTOR_SIZE.default,
            angular_speed: limits::ANGULAR_SPEED.default,
            reverse_direction: false,
        }
    }
}

impl ScanHead {
    /// Whether moving by `step` keeps the head inside the sector
    pub fn is_inside(&self, step: i32) -> bool {
        let resolution = ANGULAR_RESOLUTION as i32;
        let mut relative = (step + self.angle as i32 + resolution).rem_euclid(resolution);
        if relative >= resolution / 2 {
            relative -= resolution;
        }
        let half = self.sector_size as i32 / 2;
        relative.clamp(-half, half) == relative
    }

    /// Pick the next step, reversing at the sector edges
    ///
    /// When neither direction stays inside the sector the head is sent
    /// straight back to bearing zero.
    pub fn next_step(&mut self) -> i32 {
        let mut step = self.angular_speed as i32;
        if self.reverse_direction {
            step = -step;
        }

        if !self.is_inside(step) {
            self.reverse_direction = !self.reverse_direction;
            step = -step;
        }

        if !self.is_inside(step) {
            self.reverse_direction = !self.reverse_direction;
            step = -(self.angle as i32);
        }

        step
    }

    /// Move the head by `step`; returns the new angle
    pub fn apply(&mut self, step: i32) -> u16 {
        let resolution = ANGULAR_RESOLUTION as i32;
        self.angle = (self.angle as i32 + step).rem_euclid(resolution) as u16;
        self.angle
    }

    /// Choose and apply the next step; returns the new angle
    pub fn advance(&mut self) -> u16 {
        let step = self.next_step();
        self.apply(step)
    }
}
