pub mod settings;

use crate::{NetframeError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Transport protocol selector. Only TCP is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Tcp,
}

/// Server configuration.
///
/// `ip_address` and `port` are required; everything else has a usable
/// default. Construct with [`ServerConfig::new`] and adjust through the
/// builder methods, or load from `NETFRAME_*` environment variables via
/// [`ServerConfig::from_env`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub ip_address: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: TransportProtocol,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_max_connections() -> usize {
    1
}

fn default_buffer_size() -> usize {
    4096
}

impl ServerConfig {
    pub fn new(ip_address: impl Into<String>, port: u16) -> Self {
        Self {
            ip_address: ip_address.into(),
            port,
            protocol: TransportProtocol::Tcp,
            max_connections: default_max_connections(),
            buffer_size: default_buffer_size(),
        }
    }

    /// Set the admission capacity (concurrent connection limit).
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the per-session receive buffer size in bytes.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Validate configuration bounds before the server starts.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(NetframeError::Config(
                "max_connections must be >= 1".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(NetframeError::Config("buffer_size must be > 0".to_string()));
        }
        self.parse_ip()?;
        Ok(())
    }

    /// The socket address the server will bind to.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.parse_ip()?, self.port))
    }

    fn parse_ip(&self) -> Result<IpAddr> {
        self.ip_address.parse::<IpAddr>().map_err(|e| {
            NetframeError::Config(format!("invalid ip_address '{}': {}", self.ip_address, e))
        })
    }
}
