//! Command-line interface for k8056-relay.
//!
//! Switches relays on a K8056 chain from the shell. Bus and timing settings
//! come from the configuration file and environment; `--endpoint` overrides
//! the configured bus for a single invocation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use k8056_relay::config::Config;
use k8056_relay::tracing::{self, prelude::*};
use k8056_relay::transport::Endpoint;
use k8056_relay::{BusDriver, Driver};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Configuration file layered over /etc/k8056/k8056.toml
    #[arg(short, long, env = "K8056_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device or tcp://host:port of a serial bridge
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Switch a relay on (relay 9 switches the whole card)
    On { card: u32, relay: u32 },

    /// Switch a relay off (relay 9 switches the whole card)
    Off { card: u32, relay: u32 },

    /// Switch off every relay on every configured card
    AllOff,

    /// Send the emergency clear frame
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_with(args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        config.bus.endpoint = endpoint;
    }

    tracing::init(&config.log.level);

    let endpoint: Endpoint = config.endpoint()?;
    let transport = endpoint.transport(config.port_settings()?);
    let driver: BusDriver = Driver::new(transport, config.driver_config()?);
    debug!(
        %endpoint,
        repeat = driver.config().repeat,
        wait = ?driver.config().wait,
        "Bus driver ready."
    );

    match args.command {
        Command::On { card, relay } => driver
            .activate(card, relay)
            .await
            .with_context(|| format!("switching on card {} relay {}", card, relay))?,
        Command::Off { card, relay } => driver
            .deactivate(card, relay)
            .await
            .with_context(|| format!("switching off card {} relay {}", card, relay))?,
        Command::AllOff => {
            for card in 1..=config.bus.cards {
                driver
                    .deactivate(card, 9)
                    .await
                    .with_context(|| format!("switching off card {}", card))?;
            }
        }
        Command::Stop => driver.emergency_stop().await.context("emergency stop")?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_on() {
        let args = Args::parse_from(["k8056", "-e", "tcp://bridge:4001", "on", "3", "5"]);
        assert_eq!(args.endpoint.as_deref(), Some("tcp://bridge:4001"));
        assert!(matches!(args.command, Command::On { card: 3, relay: 5 }));
    }

    #[test]
    fn test_parse_all_off() {
        let args = Args::parse_from(["k8056", "all-off"]);
        assert!(matches!(args.command, Command::AllOff));
    }
}
