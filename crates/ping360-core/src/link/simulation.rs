//! Simulated Ping360
//!
//! An in-process device model for running the driver without hardware. It
//! answers device information requests and transducer commands with
//! synthetic profiles: a noise floor plus one echo whose range drifts with
//! the bearing, so a full sweep draws a closed contour.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio_util::bytes::BytesMut;

use super::{LinkCommand, LinkEvent};
use crate::protocol::{
    DeviceData, DeviceInformation, Message, MessageId, Nack, Packet, ParserStats, PingCodec,
};
use crate::sensor::state::{limits, ANGULAR_RESOLUTION};

/// Device id the simulated sonar answers from
const SIMULATED_DEVICE_ID: u8 = 2;

/// Simulated Ping360 firmware
pub struct SimulatedPing360 {
    info: DeviceInformation,
    rng: StdRng,
    /// Added latency per profile, roughly the time of flight at max range
    ping_delay: Duration,
}

impl Default for SimulatedPing360 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPing360 {
    /// Create a simulator seeded from entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a reproducible simulator
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            info: DeviceInformation {
                device_type: 2,
                device_revision: 1,
                firmware_version_major: 3,
                firmware_version_minor: 3,
                firmware_version_patch: 0,
            },
            rng,
            ping_delay: Duration::from_millis(5),
        }
    }

    /// Answer one host frame; returns the frames the device sends back
    pub fn respond(&mut self, packet: &Packet) -> Vec<Packet> {
        let message = match Message::decode(packet) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("simulator: ignoring malformed request: {e}");
                return Vec::new();
            }
        };

        match message {
            Message::GeneralRequest { requested_id } if requested_id == MessageId::DeviceInformation.id() => {
                vec![self.info.to_packet(SIMULATED_DEVICE_ID)]
            }
            Message::Transducer(control) => {
                if let Some(reason) = reject_reason(control.sample_period, control.number_of_samples) {
                    return vec![Nack {
                        nacked_id: MessageId::Transducer.id(),
                        message: reason.to_string(),
                    }
                    .to_packet(SIMULATED_DEVICE_ID)];
                }
                if !control.transmit {
                    return Vec::new();
                }
                let data = self.profile(control.angle, control.number_of_samples);
                vec![DeviceData {
                    mode: control.mode,
                    gain_setting: control.gain_setting,
                    angle: control.angle % ANGULAR_RESOLUTION,
                    transmit_duration: control.transmit_duration,
                    sample_period: control.sample_period,
                    transmit_frequency: control.transmit_frequency,
                    number_of_samples: control.number_of_samples,
                    data_length: data.len() as u16,
                    data,
                }
                .to_packet(SIMULATED_DEVICE_ID)]
            }
            other => {
                tracing::debug!("simulator: no reply for message {}", other.id());
                Vec::new()
            }
        }
    }

    fn profile(&mut self, angle: u16, samples: u16) -> Vec<u8> {
        let n = samples as usize;
        let bearing = angle as f64 * 2.0 * PI / ANGULAR_RESOLUTION as f64;
        let echo = n as f64 * (0.5 + 0.25 * (bearing * 2.0).sin());
        let width = (n as f64 / 40.0).max(1.0);

        (0..n)
            .map(|i| {
                let distance = (i as f64 - echo) / width;
                let peak = 220.0 * (-distance * distance).exp();
                let noise = self.rng.gen_range(0.0..25.0);
                (peak + noise).min(255.0) as u8
            })
            .collect()
    }
}

/// Firmware rejects parameter sets outside its limits
fn reject_reason(sample_period: u16, number_of_samples: u16) -> Option<&'static str> {
    if sample_period < limits::SAMPLE_PERIOD.min {
        Some("sample period too short")
    } else if number_of_samples == 0 || number_of_samples > limits::NUMBER_OF_POINTS.max {
        Some("invalid number of samples")
    } else {
        None
    }
}

pub(crate) async fn run(
    mut device: SimulatedPing360,
    stats: Arc<ParserStats>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    // Device side decodes what the host writes; host side counts what it receives
    let mut device_codec = PingCodec::default();
    let mut host_codec = PingCodec::new(stats);
    let mut inbound = BytesMut::new();
    let mut outbound = BytesMut::new();

    let _ = events.send(LinkEvent::Opened);

    while let Some(command) = commands.recv().await {
        match command {
            LinkCommand::Write(bytes) => {
                inbound.extend_from_slice(&bytes);
                for request in device_codec.decode_all(&mut inbound) {
                    let replies = device.respond(&request);
                    if request.message_id == MessageId::Transducer.id() {
                        tokio::time::sleep(device.ping_delay).await;
                    }
                    for reply in replies {
                        outbound.extend_from_slice(&reply.to_bytes());
                    }
                }
                for packet in host_codec.decode_all(&mut outbound) {
                    if events.send(LinkEvent::Packet(packet)).is_err() {
                        return;
                    }
                }
            }
            LinkCommand::SetBaudRate(_) | LinkCommand::Reconnect => {}
            LinkCommand::Close => break,
        }
    }

    let _ = events.send(LinkEvent::Closed);
}
