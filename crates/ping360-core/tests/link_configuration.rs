//! Tests for link configuration validation and serialization

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    use ping360_core::link::{
        open_link, LinkConfigError, LinkConfiguration, LinkError, LinkType, PingDeviceType,
    };

    fn udp() -> LinkConfiguration {
        LinkConfiguration::new(LinkType::Udp, ["192.168.2.1", "9092"])
            .with_name("sonar")
            .with_device_type(PingDeviceType::Ping360)
    }

    #[test]
    fn test_udp_configuration_is_valid() {
        let config = udp();
        assert!(config.is_valid());
        assert_eq!(config.udp_host(), Some("192.168.2.1"));
        assert_eq!(config.udp_port(), Some(9092));
        assert_eq!(config.serial_port(), None);
        assert_eq!(config.conf_string(), "192.168.2.1:9092");
    }

    #[test]
    fn test_stream_roundtrip() {
        let config = udp();
        let mut buffer = Vec::new();
        config.write_to(&mut buffer).unwrap();

        let decoded = LinkConfiguration::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(decoded.args(), ["192.168.2.1", "9092"]);
        assert_eq!(decoded.name(), "sonar");
        assert_eq!(decoded.link_type(), LinkType::Udp);
        assert_eq!(decoded.device_type(), PingDeviceType::Ping360);
    }

    #[test]
    fn test_full_string_roundtrip() {
        let config = udp();
        assert_eq!(config.full_conf_string(), "3:sonar:192.168.2.1:9092");

        let parsed: LinkConfiguration = config.full_conf_string().parse().unwrap();
        assert_eq!(parsed.args(), config.args());
        assert_eq!(parsed.name(), config.name());
        assert_eq!(parsed.link_type(), config.link_type());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = udp();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: LinkConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_first_violated_rule_is_reported() {
        let cases: Vec<(LinkConfiguration, LinkConfigError)> = vec![
            (
                LinkConfiguration::new(LinkType::None, ["x"]),
                LinkConfigError::NoType,
            ),
            (
                LinkConfiguration::new(LinkType::Serial, Vec::<String>::new()),
                LinkConfigError::NoArgs,
            ),
            (
                LinkConfiguration::new(LinkType::Udp, ["192.168.2.1"]),
                LinkConfigError::InvalidArgsNumber {
                    link_type: LinkType::Udp,
                    expected: 2,
                    actual: 1,
                },
            ),
            (
                LinkConfiguration::new(LinkType::Serial, ["/dev/ttyUSB0", ""]),
                LinkConfigError::ArgsAreEmpty(1),
            ),
            (
                LinkConfiguration::new(LinkType::Udp, ["not a host!", "9092"]),
                LinkConfigError::InvalidUrl("not a host!".to_string()),
            ),
            (
                LinkConfiguration::new(LinkType::Udp, ["192.168.2.1", "70000"]),
                LinkConfigError::InvalidUrl("192.168.2.1:70000".to_string()),
            ),
            (
                LinkConfiguration::new(LinkType::Serial, ["/dev/ttyUSB0", "fast"]),
                LinkConfigError::InvalidBaudRate("fast".to_string()),
            ),
        ];

        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected), "{config}");
            assert!(!config.is_valid());
        }
    }

    #[test]
    fn test_unknown_type_in_stream() {
        let mut buffer = Vec::new();
        LinkConfiguration::new(LinkType::Ping360Simulation, Vec::<String>::new())
            .write_to(&mut buffer)
            .unwrap();
        // Type id sits right before the trailing device type
        let type_offset = buffer.len() - 8;
        buffer[type_offset..type_offset + 4].copy_from_slice(&42u32.to_be_bytes());

        assert_eq!(
            LinkConfiguration::read_from(&mut Cursor::new(buffer)),
            Err(LinkConfigError::InvalidType(42))
        );
    }

    #[test]
    fn test_invalid_configuration_is_never_opened() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let config = LinkConfiguration::new(LinkType::Serial, ["/dev/ttyUSB0"]);

        // Fails before anything is spawned, so no runtime is needed
        match open_link(&config, tx) {
            Err(LinkError::Config(LinkConfigError::InvalidArgsNumber { actual: 1, .. })) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ping1d_simulation_unsupported() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let config = LinkConfiguration::new(LinkType::Ping1DSimulation, Vec::<String>::new());
        assert!(matches!(
            open_link(&config, tx),
            Err(LinkError::Unsupported(LinkType::Ping1DSimulation))
        ));
    }
}
