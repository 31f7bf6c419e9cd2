//! Scan with a Ping360 and log what it sees
//!
//! ```text
//! cargo run --example scan                              # simulated sonar
//! cargo run --example scan -- ports                     # list serial ports
//! cargo run --example scan -- serial /dev/ttyUSB0 115200
//! cargo run --example scan -- udp 192.168.2.2 12345
//! cargo run --example scan -- file capture.bin
//! ```
//!
//! Set `RUST_LOG=ping360_core=debug` to see the protocol traffic.

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use ping360_core::prelude::*;

fn link_from_args(args: &[String]) -> Result<Option<LinkConfiguration>> {
    let (kind, rest) = match args.split_first() {
        Some((kind, rest)) => (kind.as_str(), rest),
        None => {
            let simulation = LinkConfiguration::new(LinkType::Ping360Simulation, Vec::<String>::new());
            return Ok(Some(simulation));
        }
    };

    let link_type = match kind {
        "ports" => return Ok(None),
        "serial" => LinkType::Serial,
        "udp" => LinkType::Udp,
        "file" => LinkType::File,
        "sim" => LinkType::Ping360Simulation,
        other => bail!("unknown link type '{other}'"),
    };

    let config = LinkConfiguration::new(link_type, rest.iter().cloned()).with_name("scan");
    config
        .validate()
        .with_context(|| format!("invalid link configuration '{config}'"))?;
    Ok(Some(config))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ping360_core=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(link) = link_from_args(&args)? else {
        for port in list_ports() {
            println!("{}", port.name);
        }
        return Ok(());
    };

    let mut sensor = Ping360::connect(&link, DriverConfig::default())?;
    let mut events = sensor.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                sensor.close()?;
                break;
            }
            event = events.recv() => match event {
                Ok(SensorEvent::DataChanged { angle, ping_number, samples }) => {
                    let peak = samples
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(index, _)| index)
                        .unwrap_or_default();
                    tracing::info!(
                        "ping {ping_number} at {angle} grad: peak at sample {peak} of {}",
                        samples.len()
                    );
                }
                Ok(SensorEvent::BaudRateCommitted { baud_rate }) => {
                    tracing::info!("Using {baud_rate} baud");
                }
                Ok(SensorEvent::StateChanged { state: DriverState::Disconnected }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::warn!("Skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    sensor.join().await?;
    Ok(())
}
