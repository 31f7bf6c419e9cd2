//! Shared fixtures for driver tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use ping360_core::config::DriverConfig;
use ping360_core::link::{BaudSwitch, Link, LinkError, LinkEvent, LinkType};
use ping360_core::protocol::{DeviceData, DeviceInformation, MessageId, Nack, Packet, ParserCounters};
use ping360_core::sensor::{DriverInput, DriverState, Ping360};

/// What a [`MockLink`] saw, shared with the test body
#[derive(Debug, Default)]
pub struct LinkRecord {
    pub written: Vec<Packet>,
    pub bauds: Vec<u32>,
    pub reconnects: usize,
    pub counters: ParserCounters,
}

impl LinkRecord {
    pub fn count(&self, id: MessageId) -> usize {
        self.written.iter().filter(|p| p.message_id == id.id()).count()
    }
}

/// Link that records writes and baud switches, with scripted parser counters
#[derive(Debug, Clone)]
pub struct MockLink {
    pub record: Arc<Mutex<LinkRecord>>,
    pub link_type: LinkType,
}

impl MockLink {
    pub fn serial() -> Self {
        Self {
            record: Arc::new(Mutex::new(LinkRecord::default())),
            link_type: LinkType::Serial,
        }
    }

    pub fn udp() -> Self {
        Self {
            link_type: LinkType::Udp,
            ..Self::serial()
        }
    }

    pub fn written(&self) -> usize {
        self.record.lock().unwrap().written.len()
    }

    pub fn last_written(&self) -> Option<Packet> {
        self.record.lock().unwrap().written.last().cloned()
    }

    pub fn bauds(&self) -> Vec<u32> {
        self.record.lock().unwrap().bauds.clone()
    }

    pub fn reconnects(&self) -> usize {
        self.record.lock().unwrap().reconnects
    }

    pub fn set_counters(&self, parsed: u64, errors: u64) {
        self.record.lock().unwrap().counters = ParserCounters { parsed, errors };
    }
}

impl Link for MockLink {
    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<(), LinkError> {
        self.record.lock().unwrap().written.push(packet.clone());
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<BaudSwitch, LinkError> {
        if self.link_type != LinkType::Serial {
            return Ok(BaudSwitch::NotApplicable);
        }
        self.record.lock().unwrap().bauds.push(baud_rate);
        Ok(BaudSwitch::Applied)
    }

    fn start_connection(&mut self) -> Result<(), LinkError> {
        self.record.lock().unwrap().reconnects += 1;
        Ok(())
    }

    fn counters(&self) -> ParserCounters {
        self.record.lock().unwrap().counters
    }
}

pub fn device_information() -> Packet {
    DeviceInformation {
        device_type: 2,
        device_revision: 1,
        firmware_version_major: 3,
        firmware_version_minor: 3,
        firmware_version_patch: 0,
    }
    .to_packet(2)
}

pub fn profile(angle: u16, data_length: u16, data: Vec<u8>) -> Packet {
    DeviceData {
        mode: 1,
        gain_setting: 0,
        angle,
        transmit_duration: 32,
        sample_period: 80,
        transmit_frequency: 750,
        number_of_samples: data_length,
        data_length,
        data,
    }
    .to_packet(2)
}

pub fn transducer_nack() -> Packet {
    Nack {
        nacked_id: MessageId::Transducer.id(),
        message: "invalid parameters".to_string(),
    }
    .to_packet(2)
}

pub fn packet(packet: Packet) -> DriverInput {
    DriverInput::Link(LinkEvent::Packet(packet))
}

/// Driver that skips the baud search and is already requesting profiles
pub fn acquiring_driver() -> (Ping360<MockLink>, MockLink) {
    let link = MockLink::serial();
    let config = DriverConfig {
        baud_rates: vec![115_200],
        probes_per_round: 1,
        ..DriverConfig::default()
    };
    let mut driver = Ping360::new(link.clone(), config);

    driver.handle(DriverInput::Link(LinkEvent::Opened));
    driver.handle(packet(device_information()));
    driver.handle(packet(device_information()));
    assert_eq!(driver.driver_state(), DriverState::Acquiring);

    (driver, link)
}
