mod memory;
mod reader;
mod stats;
mod tcp;

use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use memory::{MemoryConnector, MemoryListener, MemoryNetwork, MemoryTransport};
pub use reader::{Frame, MessageReader};
pub use stats::NetworkStats;
pub use tcp::{TcpConnector, TcpTransport};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in {s}"))?;
        if host.is_empty() {
            return Err(format!("missing host in {s}"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in {s}: {e}"))?;
        Ok(Self::new(host, port))
    }
}

/// Ordered, reliable byte pipe to one server tier.
pub trait Transport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Everything received since the last call, without blocking. An error
    /// means the connection is gone.
    fn receive(&mut self) -> io::Result<Vec<Bytes>>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}

pub trait Connector {
    fn connect(
        &mut self,
        address: &ServerAddress,
        timeout: Duration,
    ) -> io::Result<Box<dyn Transport>>;
}
