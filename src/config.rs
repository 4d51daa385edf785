use crate::error::Error;
use crate::muted_error;
use serde::Deserialize;
use std::fs::read_to_string;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

/// Default inspector port.
pub const DEFAULT_PORT: u16 = 9123;

/// Inspector configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the TCP transport.
    pub listen: SocketAddr,
    /// Delay of a coalesced listing broadcast in milliseconds.
    pub push_delay_ms: u64,
    /// Trace every sent and received frame.
    pub trace_wire: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            push_delay_ms: 200,
            trace_wire: false,
        }
    }
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/ibridge/config.toml";

    /// Load configuration from file.
    ///
    /// Without explicit path, configuration is read from `~/.config/ibridge/config.toml`,
    /// a missing or unreadable default file gives a default configuration.
    pub fn from_file(path: Option<&Path>) -> Result<Self, Error> {
        let data = match path {
            None => {
                let Some(home) = home::home_dir() else {
                    return Ok(Self::default());
                };
                match muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))) {
                    Some(data) => data,
                    None => return Ok(Self::default()),
                }
            }
            Some(path) => read_to_string(path)?,
        };
        Self::parse(&data)
    }

    /// Parse TOML configuration, missing keys take default values.
    pub fn parse(data: &str) -> Result<Self, Error> {
        Ok(toml::de::from_str(data)?)
    }

    pub fn push_delay(&self) -> Duration {
        Duration::from_millis(self.push_delay_ms)
    }
}
