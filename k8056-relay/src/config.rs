//! Configuration management for k8056-relay.
//!
//! Configuration is layered: built-in defaults, then the system file
//! `/etc/k8056/k8056.toml`, then an optional file named on the command line,
//! then environment variables prefixed with `K8056_`. Nested keys use a
//! double underscore, e.g. `K8056_DRIVER__REPEAT=2`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::driver::{DriverConfig, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::transport::{Endpoint, PortSettings, DEFAULT_BAUD_RATE, DEFAULT_CHANNEL_TIMEOUT};

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/k8056/k8056.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "K8056_";

/// Highest card address on a chain.
pub const MAX_CARDS: u32 = 255;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Bus connection
    pub bus: BusConfig,

    /// Driver timing
    pub driver: DriverSettings,

    /// Logging
    pub log: LogConfig,
}

/// Where and how the bus is attached.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    /// Serial device path or `tcp://host:port` of a serial bridge
    pub endpoint: String,

    pub baud_rate: u32,

    /// Read/write timeout on the channel itself (seconds)
    pub channel_timeout_secs: f64,

    /// Number of cards on the chain, addressed 1..=cards
    pub cards: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoint: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            channel_timeout_secs: DEFAULT_CHANNEL_TIMEOUT.as_secs_f64(),
            cards: 1,
        }
    }
}

/// Retransmission and timing settings for the driver.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Extra copies of every frame
    pub repeat: u32,

    /// Pause after every copy (seconds)
    pub wait_secs: f64,

    /// Bound on a whole bus session (seconds)
    pub timeout_secs: f64,
}

// One resend with a 300 ms gap has proven reliable on long cable runs.
impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            repeat: 1,
            wait_secs: 0.3,
            timeout_secs: DEFAULT_TIMEOUT.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when RUST_LOG is not set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration, layering `path` over the system file.
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let mut figment = Self::figment().merge(Toml::file(SYSTEM_CONFIG_PATH));

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Defaults only; callers layer their own providers on top.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| Error::Config(format!("failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;

        if self.bus.baud_rate == 0 {
            return Err(Error::Config("bus.baud_rate must be positive".to_string()));
        }
        if !(1..=MAX_CARDS).contains(&self.bus.cards) {
            return Err(Error::Config(format!(
                "bus.cards must be between 1 and {}, got {}",
                MAX_CARDS, self.bus.cards
            )));
        }

        positive_secs("bus.channel_timeout_secs", self.bus.channel_timeout_secs)?;
        non_negative_secs("driver.wait_secs", self.driver.wait_secs)?;
        positive_secs("driver.timeout_secs", self.driver.timeout_secs)?;

        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.bus.endpoint)
    }

    pub fn port_settings(&self) -> Result<PortSettings> {
        Ok(PortSettings {
            baud_rate: self.bus.baud_rate,
            timeout: positive_secs(
                "bus.channel_timeout_secs",
                self.bus.channel_timeout_secs,
            )?,
        })
    }

    pub fn driver_config(&self) -> Result<DriverConfig> {
        Ok(DriverConfig {
            repeat: self.driver.repeat,
            wait: non_negative_secs("driver.wait_secs", self.driver.wait_secs)?,
            timeout: positive_secs("driver.timeout_secs", self.driver.timeout_secs)?,
        })
    }
}

fn non_negative_secs(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        Error::Config(format!(
            "{} must be a non-negative number of seconds, got {}",
            key, secs
        ))
    })
}

fn positive_secs(key: &str, secs: f64) -> Result<Duration> {
    match non_negative_secs(key, secs)? {
        d if d.is_zero() => Err(Error::Config(format!("{} must be greater than zero", key))),
        d => Ok(d),
    }
}
