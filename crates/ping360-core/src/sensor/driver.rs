//! Ping360 protocol state machine
//!
//! One [`Ping360`] drives one sonar. Every input (decoded frames from the
//! link, consumer commands, and both timers) is funnelled through
//! [`Ping360::handle`], so device state is only ever touched from a single
//! task. The request loop is closed: a new probe or profile request is only
//! written after the previous one was answered or timed out.
//!
//! ```text
//!  Disconnected --link opened--> Configuring --device info--> Acquiring
//!        ^                            |                          |
//!        +-------- link closed -------+--------------------------+
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::baud::{BaudDetector, ProbeStep, RoundOutcome};
use super::events::{DriverState, SensorEvent};
use super::frequency::FrequencyTracker;
use super::state::{limits, DeviceState, TransducerSettings};
use crate::config::DriverConfig;
use crate::link::{
    open_link, BaudSwitch, Link, LinkConfiguration, LinkError, LinkEvent, LinkHandle,
};
use crate::protocol::{
    general_request, DeviceData, DeviceInformation, Message, MessageId, Nack, Packet,
};

/// Capacity of the notification channel; slow subscribers lag rather than block
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Consumer request, applied on the driver task
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorCommand {
    SetGainSetting(u8),
    SetTransmitDuration(u16),
    SetSamplePeriod(u16),
    SetTransmitFrequency(u16),
    SetNumberOfPoints(u16),
    SetSectorSize(u16),
    SetAngularSpeed(u16),
    SetReverseDirection(bool),
    SetSpeedOfSound(f64),
}

/// Everything the driver reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum DriverInput {
    Link(LinkEvent),
    ProfileTimeout,
    BaudTimeout,
    Command(SensorCommand),
}

/// Ping360 driver bound to a link
pub struct Ping360<L: Link> {
    link: L,
    config: DriverConfig,
    state: DeviceState,
    driver_state: DriverState,
    /// Present only while a baud rate search is running
    baud: Option<BaudDetector>,
    frequencies: FrequencyTracker,
    clock: Instant,
    profile_deadline: Option<Instant>,
    baud_deadline: Option<Instant>,
    /// Requests written since the last reply or timeout
    outstanding: u32,
    events: broadcast::Sender<SensorEvent>,
}

impl<L: Link> Ping360<L> {
    pub fn new(link: L, config: DriverConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = DeviceState {
            speed_of_sound: config.speed_of_sound,
            ..DeviceState::default()
        };

        Self {
            link,
            config,
            state,
            driver_state: DriverState::Disconnected,
            baud: None,
            frequencies: FrequencyTracker::new(),
            clock: Instant::now(),
            profile_deadline: None,
            baud_deadline: None,
            outstanding: 0,
            events,
        }
    }

    /// Receive every notification published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn driver_state(&self) -> DriverState {
        self.driver_state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Baud search of the current session, if one is running
    pub fn baud_detector(&self) -> Option<&BaudDetector> {
        self.baud.as_ref()
    }

    /// Requests written and not yet answered or timed out
    pub fn outstanding_requests(&self) -> u32 {
        self.outstanding
    }

    pub fn profile_deadline(&self) -> Option<Instant> {
        self.profile_deadline
    }

    pub fn baud_deadline(&self) -> Option<Instant> {
        self.baud_deadline
    }

    /// Smoothed arrival rate per message id, in Hz
    pub fn frequencies(&self) -> HashMap<u16, f64> {
        self.frequencies.frequencies()
    }

    /// Process one input
    pub fn handle(&mut self, input: DriverInput) {
        match input {
            DriverInput::Link(LinkEvent::Opened) => self.on_link_opened(),
            DriverInput::Link(LinkEvent::Packet(packet)) => self.on_packet(&packet),
            DriverInput::Link(LinkEvent::Closed) => self.on_link_closed(),
            DriverInput::ProfileTimeout => self.on_profile_timeout(),
            DriverInput::BaudTimeout => self.on_baud_timeout(),
            DriverInput::Command(command) => self.apply_command(command),
        }
    }

    /// Run until the link closes or its event channel is dropped
    pub async fn run(
        mut self,
        mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
        mut commands: mpsc::UnboundedReceiver<SensorCommand>,
    ) {
        let mut commands_open = true;

        loop {
            let input = tokio::select! {
                event = link_events.recv() => match event {
                    Some(event) => DriverInput::Link(event),
                    None => break,
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => DriverInput::Command(command),
                    None => {
                        commands_open = false;
                        continue;
                    }
                },
                _ = wait_until(self.profile_deadline) => DriverInput::ProfileTimeout,
                _ = wait_until(self.baud_deadline) => DriverInput::BaudTimeout,
            };

            let closed = matches!(input, DriverInput::Link(LinkEvent::Closed));
            self.handle(input);
            if closed {
                break;
            }
        }

        tracing::debug!("Ping360 driver stopped");
    }

    fn on_link_opened(&mut self) {
        tracing::info!("Link opened, starting baud rate detection");

        let detector = BaudDetector::new(
            self.config.baud_rates.clone(),
            self.config.probes_per_round,
        );
        // Without candidates the current rate is kept and acquisition starts on the first reply
        self.state.configuring = detector.is_active();
        self.baud = detector.is_active().then_some(detector);
        self.outstanding = 0;
        self.profile_deadline = None;
        self.set_driver_state(DriverState::Configuring);
        self.publish(SensorEvent::LinkUpdated);

        self.send_probe();
        self.arm_baud_timer();
    }

    fn on_link_closed(&mut self) {
        tracing::info!("Link closed");

        self.profile_deadline = None;
        self.baud_deadline = None;
        self.baud = None;
        self.state.configuring = false;
        self.outstanding = 0;
        self.set_driver_state(DriverState::Disconnected);
        self.publish(SensorEvent::LinkUpdated);
    }

    fn on_packet(&mut self, packet: &Packet) {
        let id = packet.message_id;
        tracing::debug!("Handling message {id}");

        let elapsed = self.clock.elapsed();
        self.frequencies.record(id, elapsed);
        self.publish(SensorEvent::MessageFrequencyUpdated {
            frequencies: self.frequencies.frequencies(),
        });

        match Message::decode(packet) {
            Ok(Message::DeviceInformation(info)) => self.on_device_information(info),
            Ok(Message::DeviceData(data)) => self.on_device_data(&data),
            Ok(Message::Nack(nack)) => self.on_nack(&nack),
            Ok(other) => tracing::warn!("Unhandled message id {}", other.id()),
            Err(e) => tracing::warn!("Dropping malformed message {id}: {e}"),
        }

        self.publish(SensorEvent::MessageParsed { id });
    }

    fn on_device_information(&mut self, info: DeviceInformation) {
        if self.state.device_information != Some(info) {
            self.state.device_information = Some(info);
            self.publish(SensorEvent::DeviceInformation { info });
        }

        match self.driver_state {
            DriverState::Configuring if self.state.configuring => {
                self.outstanding = 0;
                self.arm_baud_timer();
                self.probe_step();
            }
            DriverState::Configuring => {
                self.outstanding = 0;
                self.baud_deadline = None;
                self.set_driver_state(DriverState::Acquiring);
                self.request_next_profile();
            }
            // Late replies to probes must not open a second request loop
            DriverState::Acquiring | DriverState::Disconnected => {
                tracing::debug!("Ignoring device information outside configuration");
            }
        }
    }

    fn on_device_data(&mut self, data: &DeviceData) {
        let kept = self.state.apply_profile(data);
        self.publish(SensorEvent::AngleChanged {
            angle: self.state.angle(),
        });

        if kept > 0 {
            self.state.ping_number += 1;
            if self.state.refreshes_view() {
                self.publish(SensorEvent::DataChanged {
                    angle: self.state.angle(),
                    ping_number: self.state.ping_number,
                    samples: Arc::from(self.state.samples.as_slice()),
                });
            }
        }

        if self.driver_state == DriverState::Acquiring {
            self.outstanding = 0;
            self.request_next_profile();
        }
    }

    fn on_nack(&mut self, nack: &Nack) {
        if nack.nacked_id != MessageId::Transducer.id() {
            tracing::warn!("Message {} was NACKed: {}", nack.nacked_id, nack.message);
            return;
        }

        tracing::warn!(
            "Transducer control was NACKed ({}), reverting to default settings",
            nack.message
        );
        let defaults = TransducerSettings::default();
        self.state.settings = defaults;

        if self.driver_state == DriverState::Acquiring {
            self.outstanding = 0;
            self.request_next_profile();
        }

        self.publish(SensorEvent::GainSettingChanged {
            gain_setting: defaults.gain_setting,
        });
        self.publish(SensorEvent::TransmitDurationChanged {
            transmit_duration: defaults.transmit_duration,
        });
        self.publish(SensorEvent::SamplePeriodChanged {
            sample_period: defaults.sample_period,
        });
        self.publish(SensorEvent::TransmitFrequencyChanged {
            transmit_frequency: defaults.transmit_frequency,
        });
        self.publish(SensorEvent::NumberOfPointsChanged {
            number_of_points: defaults.number_of_points,
        });
        self.publish_range();
    }

    fn on_profile_timeout(&mut self) {
        if self.driver_state != DriverState::Acquiring {
            self.profile_deadline = None;
            return;
        }
        tracing::warn!("Profile message timeout, new request will be done");
        self.outstanding = 0;
        self.request_next_profile();
    }

    fn on_baud_timeout(&mut self) {
        if self.driver_state != DriverState::Configuring {
            self.baud_deadline = None;
            return;
        }
        tracing::warn!("Device information timeout");
        self.outstanding = 0;
        self.arm_baud_timer();

        if self.state.configuring {
            self.probe_step();
        } else {
            // Rate committed but the device has not answered yet
            self.send_probe();
        }
    }

    /// Count one probe cycle and send exactly one probe
    fn probe_step(&mut self) {
        let counters = self.link.counters();
        let step = match self.baud.as_mut() {
            Some(detector) => detector.probe(counters),
            None => ProbeStep::Idle,
        };

        if let ProbeStep::Round(outcome) = step {
            self.apply_round(outcome);
        }
        self.send_probe();
    }

    fn apply_round(&mut self, outcome: RoundOutcome) {
        if let Some(rate) = outcome.switch_to {
            tracing::debug!("Probing at {rate} baud");
            self.switch_baud_rate(rate);
        }

        if let Some(rate) = outcome.committed {
            self.baud = None;
            self.state.configuring = false;
            match self.switch_baud_rate(rate) {
                Some(BaudSwitch::Applied) => {
                    tracing::info!("Baud rate {rate} committed");
                    self.publish(SensorEvent::BaudRateCommitted { baud_rate: rate });
                }
                Some(BaudSwitch::NotApplicable) => {
                    tracing::info!("Baud rate search finished, link has no baud rate");
                }
                None => {}
            }
        }
    }

    /// Set the link rate and restart the connection so it takes effect
    ///
    /// Returns `None` when the link refused the change.
    fn switch_baud_rate(&mut self, rate: u32) -> Option<BaudSwitch> {
        let switch = match self.link.set_baud_rate(rate) {
            Ok(switch) => switch,
            Err(e) => {
                tracing::warn!("Failed to switch baud rate to {rate}: {e}");
                return None;
            }
        };

        if switch == BaudSwitch::NotApplicable {
            tracing::debug!("Link has no baud rate, ignoring switch to {rate}");
            return Some(switch);
        }

        match self.link.start_connection() {
            Ok(()) => Some(switch),
            Err(e) => {
                tracing::warn!("Failed to restart link at {rate} baud: {e}");
                None
            }
        }
    }

    /// Step the scan head and ask for the profile at the new bearing
    fn request_next_profile(&mut self) {
        let step = self.state.head.next_step();
        self.state.head.apply(step);

        let request = self.state.transducer_request();
        self.write(&request.to_packet());
        self.profile_deadline = Some(Instant::now() + self.sensor_timeout());
    }

    fn send_probe(&mut self) {
        self.write(&general_request(MessageId::DeviceInformation));
    }

    fn write(&mut self, packet: &Packet) {
        match self.link.write_packet(packet) {
            Ok(()) => self.outstanding += 1,
            Err(e) => tracing::warn!("Failed to write message {}: {e}", packet.message_id),
        }
    }

    fn arm_baud_timer(&mut self) {
        let interval = Duration::from_millis(self.config.baud_probe_interval_ms);
        self.baud_deadline = Some(Instant::now() + interval);
    }

    fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.config.sensor_timeout_ms)
    }

    /// Clamp, store and announce a setting; it is sent with the next request
    pub fn apply_command(&mut self, command: SensorCommand) {
        match command {
            SensorCommand::SetGainSetting(value) => {
                let value = limits::GAIN_SETTING.clamp(value);
                if replace(&mut self.state.settings.gain_setting, value) {
                    self.publish(SensorEvent::GainSettingChanged {
                        gain_setting: value,
                    });
                }
            }
            SensorCommand::SetTransmitDuration(value) => {
                let value = limits::TRANSMIT_DURATION.clamp(value);
                if replace(&mut self.state.settings.transmit_duration, value) {
                    self.publish(SensorEvent::TransmitDurationChanged {
                        transmit_duration: value,
                    });
                }
            }
            SensorCommand::SetSamplePeriod(value) => {
                let value = limits::SAMPLE_PERIOD.clamp(value);
                if replace(&mut self.state.settings.sample_period, value) {
                    self.publish(SensorEvent::SamplePeriodChanged {
                        sample_period: value,
                    });
                    self.publish_range();
                }
            }
            SensorCommand::SetTransmitFrequency(value) => {
                let value = limits::TRANSMIT_FREQUENCY.clamp(value);
                if replace(&mut self.state.settings.transmit_frequency, value) {
                    self.publish(SensorEvent::TransmitFrequencyChanged {
                        transmit_frequency: value,
                    });
                }
            }
            SensorCommand::SetNumberOfPoints(value) => {
                let value = limits::NUMBER_OF_POINTS.clamp(value);
                if replace(&mut self.state.settings.number_of_points, value) {
                    self.publish(SensorEvent::NumberOfPointsChanged {
                        number_of_points: value,
                    });
                    self.publish_range();
                }
            }
            SensorCommand::SetSectorSize(value) => {
                let value = limits::SECTOR_SIZE.clamp(value);
                if replace(&mut self.state.head.sector_size, value) {
                    self.publish(SensorEvent::SectorSizeChanged { sector_size: value });
                }
            }
            SensorCommand::SetAngularSpeed(value) => {
                let value = limits::ANGULAR_SPEED.clamp(value);
                if replace(&mut self.state.head.angular_speed, value) {
                    self.publish(SensorEvent::AngularSpeedChanged {
                        angular_speed: value,
                    });
                }
            }
            SensorCommand::SetReverseDirection(value) => {
                if replace(&mut self.state.head.reverse_direction, value) {
                    self.publish(SensorEvent::ReverseDirectionChanged {
                        reverse_direction: value,
                    });
                }
            }
            SensorCommand::SetSpeedOfSound(value) => {
                if !value.is_finite() || value <= 0.0 {
                    tracing::warn!("Ignoring invalid speed of sound {value}");
                    return;
                }
                if self.state.speed_of_sound != value {
                    self.state.speed_of_sound = value;
                    self.publish(SensorEvent::SpeedOfSoundChanged {
                        speed_of_sound: value,
                    });
                    self.publish_range();
                }
            }
        }
    }

    fn set_driver_state(&mut self, state: DriverState) {
        if self.driver_state != state {
            tracing::info!("Driver state {:?} -> {:?}", self.driver_state, state);
            self.driver_state = state;
            self.publish(SensorEvent::StateChanged { state });
        }
    }

    fn publish_range(&self) {
        self.publish(SensorEvent::RangeChanged {
            range: self.state.range(),
        });
    }

    fn publish(&self, event: SensorEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

impl Ping360<LinkHandle> {
    /// Open a link for `link_config` and spawn a driver on it
    ///
    /// Fails synchronously when the configuration is invalid; nothing is
    /// spawned in that case. Must be called from within a tokio runtime.
    pub fn connect(
        link_config: &LinkConfiguration,
        config: DriverConfig,
    ) -> Result<SensorHandle, LinkError> {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let link = open_link(link_config, link_tx)?;

        let driver = Ping360::new(link.clone(), config);
        let events = driver.events.clone();
        let first_subscriber = driver.subscribe();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(driver.run(link_rx, command_rx));

        Ok(SensorHandle {
            commands,
            events,
            first_subscriber: Some(first_subscriber),
            link,
            task,
        })
    }
}

/// Handle to a driver running on its own task
#[derive(Debug)]
pub struct SensorHandle {
    commands: mpsc::UnboundedSender<SensorCommand>,
    events: broadcast::Sender<SensorEvent>,
    first_subscriber: Option<broadcast::Receiver<SensorEvent>>,
    link: LinkHandle,
    task: JoinHandle<()>,
}

impl SensorHandle {
    /// Queue a command for the driver task
    pub fn send(&self, command: SensorCommand) -> Result<(), LinkError> {
        self.commands.send(command).map_err(|_| LinkError::Closed)
    }

    /// Subscribe to notifications
    ///
    /// The first call returns a receiver created before the driver started,
    /// so it sees every event; later calls only see events from now on.
    pub fn subscribe(&mut self) -> broadcast::Receiver<SensorEvent> {
        self.first_subscriber
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    /// Close the link; the driver stops once the link reports closure
    pub fn close(&self) -> Result<(), LinkError> {
        self.link.close()
    }

    /// Wait for the driver task to finish
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// Store `value`; returns whether it differed from the previous one
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
