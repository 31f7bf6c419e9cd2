//! Tests for the Ping360 protocol state machine

mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use pretty_assertions::assert_eq;

    use ping360_core::config::DriverConfig;
    use ping360_core::link::LinkEvent;
    use ping360_core::protocol::{Message, MessageId, TransducerControl};
    use ping360_core::sensor::{
        DriverInput, DriverState, Ping360, SensorCommand, SensorEvent, TransducerSettings,
    };
    use tokio::sync::broadcast;

    fn drain(events: &mut broadcast::Receiver<SensorEvent>) -> Vec<SensorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn last_transducer(link: &MockLink) -> TransducerControl {
        match link.last_written().map(|p| Message::decode(&p)) {
            Some(Ok(Message::Transducer(control))) => control,
            other => panic!("expected a transducer request, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_baud_commit_picks_lowest_zero_score() {
        let link = MockLink::serial();
        let config = DriverConfig {
            baud_rates: vec![9600, 19200, 38400, 57600, 115200],
            ..DriverConfig::default()
        };
        let probes = config.probes_per_round;
        let mut driver = Ping360::new(link.clone(), config);
        let mut events = driver.subscribe();

        driver.handle(DriverInput::Link(LinkEvent::Opened));

        // Round 0 opens 9600; nothing to score yet
        for _ in 0..probes {
            driver.handle(DriverInput::BaudTimeout);
        }
        assert_eq!(link.bauds(), vec![9600]);

        // 9600 loses 3 of 20 replies, 19200 answers all of them
        link.set_counters(17, 0);
        for _ in 0..probes {
            driver.handle(DriverInput::BaudTimeout);
        }
        assert!(driver.state().configuring);
        assert_eq!(driver.baud_detector().and_then(|d| d.score(0)), Some(3));

        link.set_counters(37, 0);
        for _ in 0..probes {
            driver.handle(DriverInput::BaudTimeout);
        }

        assert_eq!(link.bauds(), vec![9600, 19200, 38400, 19200]);
        assert!(!driver.state().configuring);
        assert!(driver.baud_detector().is_none());
        assert!(drain(&mut events).contains(&SensorEvent::BaudRateCommitted {
            baud_rate: 19200
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_baud_commit_falls_back_to_last_candidate() {
        let link = MockLink::serial();
        let config = DriverConfig {
            baud_rates: vec![921_600, 115_200],
            probes_per_round: 2,
            ..DriverConfig::default()
        };
        let mut driver = Ping360::new(link.clone(), config);
        driver.handle(DriverInput::Link(LinkEvent::Opened));

        // Device never answers
        for _ in 0..4 {
            driver.handle(DriverInput::BaudTimeout);
        }

        assert_eq!(link.bauds(), vec![921_600, 115_200, 115_200]);
        assert_eq!(link.reconnects(), 3);
        assert!(!driver.state().configuring);
        assert_eq!(driver.driver_state(), DriverState::Configuring);

        // The committed rate keeps being probed until the device answers
        let before = link.written();
        driver.handle(DriverInput::BaudTimeout);
        assert_eq!(link.written(), before + 1);

        driver.handle(packet(device_information()));
        assert_eq!(driver.driver_state(), DriverState::Acquiring);
    }

    #[tokio::test(start_paused = true)]
    async fn test_udp_link_reports_no_baud_commit() {
        let link = MockLink::udp();
        let config = DriverConfig {
            baud_rates: vec![921_600, 115_200],
            probes_per_round: 2,
            ..DriverConfig::default()
        };
        let mut driver = Ping360::new(link.clone(), config);
        let mut events = driver.subscribe();
        driver.handle(DriverInput::Link(LinkEvent::Opened));

        for _ in 0..4 {
            driver.handle(DriverInput::BaudTimeout);
        }

        // The search still finishes, but nothing was switched or committed
        assert!(!driver.state().configuring);
        assert!(driver.baud_detector().is_none());
        assert!(link.bauds().is_empty());
        assert_eq!(link.reconnects(), 0);
        assert!(!drain(&mut events)
            .iter()
            .any(|e| matches!(e, SensorEvent::BaudRateCommitted { .. })));

        driver.handle(packet(device_information()));
        assert_eq!(driver.driver_state(), DriverState::Acquiring);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_is_normalised() {
        let (mut driver, _link) = acquiring_driver();
        let mut events = driver.subscribe();

        let mut data = vec![0u8, 255, 128];
        data.resize(200, 0);
        driver.handle(packet(profile(0, 200, data)));

        let samples = &driver.state().samples;
        assert_eq!(samples.len(), 200);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 1.0);
        assert!((samples[2] - 0.50196).abs() < 1e-5);
        assert_eq!(driver.state().ping_number, 1);

        let events = drain(&mut events);
        assert!(events.contains(&SensorEvent::AngleChanged { angle: 0 }));
        assert!(events.iter().any(|e| matches!(
            e,
            SensorEvent::DataChanged { ping_number: 1, samples, .. } if samples.len() == 200
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_declared_length_bounded_by_payload() {
        let (mut driver, link) = acquiring_driver();
        let mut events = driver.subscribe();
        driver.handle(packet(profile(10, 200, vec![0, 255, 128])));

        assert_eq!(driver.state().samples.len(), 3);
        assert!(drain(&mut events).contains(&SensorEvent::AngleChanged { angle: 10 }));
        // The head has already moved on to the next bearing
        assert_eq!(last_transducer(&link).angle, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_profile_does_not_count() {
        let (mut driver, link) = acquiring_driver();
        let before = link.written();
        driver.handle(packet(profile(4, 0, Vec::new())));

        assert_eq!(driver.state().ping_number, 0);
        assert!(driver.state().samples.is_empty());
        // The request loop continues regardless
        assert_eq!(link.written(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_changed_only_near_sector_centre() {
        let (mut driver, _link) = acquiring_driver();
        driver.handle(DriverInput::Command(SensorCommand::SetSectorSize(100)));
        let mut events = driver.subscribe();

        for (angle, expected) in [(0, true), (50, true), (51, false), (349, false), (350, true)] {
            driver.handle(packet(profile(angle, 1, vec![7])));
            let published = drain(&mut events)
                .iter()
                .any(|e| matches!(e, SensorEvent::DataChanged { .. }));
            assert_eq!(published, expected, "angle {angle}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transducer_nack_restores_defaults() {
        let (mut driver, link) = acquiring_driver();
        for command in [
            SensorCommand::SetGainSetting(2),
            SensorCommand::SetTransmitDuration(200),
            SensorCommand::SetSamplePeriod(400),
            SensorCommand::SetTransmitFrequency(900),
            SensorCommand::SetNumberOfPoints(600),
        ] {
            driver.handle(DriverInput::Command(command));
        }
        let mut events = driver.subscribe();
        let before = link.record.lock().unwrap().count(MessageId::Transducer);

        driver.handle(packet(transducer_nack()));

        let defaults = TransducerSettings::default();
        assert_eq!(driver.state().settings, defaults);
        assert_eq!(defaults.transmit_frequency, 750);
        assert_eq!(defaults.number_of_points, 1200);
        assert_eq!(
            link.record.lock().unwrap().count(MessageId::Transducer),
            before + 1
        );
        assert_eq!(driver.outstanding_requests(), 1);

        let request = last_transducer(&link);
        assert_eq!(request.gain_setting, 0);
        assert_eq!(request.transmit_duration, 32);
        assert_eq!(request.sample_period, 80);
        assert_eq!(request.transmit_frequency, 750);
        assert_eq!(request.number_of_samples, 1200);
        assert!(request.transmit);

        let changed: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|e| {
                !matches!(
                    e,
                    SensorEvent::MessageFrequencyUpdated { .. } | SensorEvent::MessageParsed { .. }
                )
            })
            .collect();
        assert_eq!(
            changed,
            vec![
                SensorEvent::GainSettingChanged { gain_setting: 0 },
                SensorEvent::TransmitDurationChanged { transmit_duration: 32 },
                SensorEvent::SamplePeriodChanged { sample_period: 80 },
                SensorEvent::TransmitFrequencyChanged { transmit_frequency: 750 },
                SensorEvent::NumberOfPointsChanged { number_of_points: 1200 },
                SensorEvent::RangeChanged { range: driver.state().range() },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_nack_is_only_logged() {
        let (mut driver, link) = acquiring_driver();
        driver.handle(DriverInput::Command(SensorCommand::SetGainSetting(1)));
        let before = link.written();

        let nack = ping360_core::protocol::Nack {
            nacked_id: MessageId::GeneralRequest.id(),
            message: "busy".to_string(),
        };
        driver.handle(packet(nack.to_packet(2)));

        assert_eq!(driver.state().settings.gain_setting, 1);
        assert_eq!(link.written(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_timeouts_keep_one_request_outstanding() {
        let (mut driver, link) = acquiring_driver();
        let before = link.written();

        for cycle in 1..=25 {
            driver.handle(DriverInput::ProfileTimeout);
            assert!(driver.outstanding_requests() <= 1);
            assert_eq!(link.written(), before + cycle);
            assert!(driver.profile_deadline().is_some());
        }
        assert_eq!(driver.driver_state(), DriverState::Acquiring);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_follow_the_sector() {
        let (mut driver, link) = acquiring_driver();
        driver.handle(DriverInput::Command(SensorCommand::SetSectorSize(20)));
        driver.handle(DriverInput::Command(SensorCommand::SetAngularSpeed(4)));

        for _ in 0..50 {
            let angle = last_transducer(&link).angle;
            assert!(angle <= 10 || angle >= 390, "angle {angle} left the sector");
            driver.handle(packet(profile(angle, 1, vec![1])));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhandled_message_leaves_state() {
        let (mut driver, link) = acquiring_driver();
        let mut events = driver.subscribe();
        let before = link.written();

        let ascii = ping360_core::protocol::PacketBuilder::new(MessageId::AsciiText.id())
            .bytes(b"hello")
            .build();
        driver.handle(packet(ascii));

        assert_eq!(link.written(), before);
        assert_eq!(driver.driver_state(), DriverState::Acquiring);
        assert!(drain(&mut events).contains(&SensorEvent::MessageParsed {
            id: MessageId::AsciiText.id()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frequencies_are_tracked() {
        let (mut driver, _link) = acquiring_driver();
        for angle in 0..5 {
            tokio::time::advance(std::time::Duration::from_millis(100)).await;
            driver.handle(packet(profile(angle, 1, vec![1])));
        }

        let rate = driver.frequencies()[&MessageId::DeviceData.id()];
        assert!((rate - 10.0).abs() < 1e-6, "rate {rate}");
    }
}
