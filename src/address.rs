use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Host and port of a skeleton, as seen by the stubs that call it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint for reaching a socket bound at `addr` from this machine.
    ///
    /// A wildcard address is replaced by the loopback address of the same
    /// family.
    pub fn local(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        Self::new(ip.to_string(), addr.port())
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_becomes_loopback() {
        let any: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        assert_eq!(Endpoint::local(any), Endpoint::new("127.0.0.1", 4000));

        let any6: SocketAddr = "[::]:4000".parse().unwrap();
        assert_eq!(Endpoint::local(any6).to_string(), "[::1]:4000");

        let fixed: SocketAddr = "10.1.2.3:80".parse().unwrap();
        assert_eq!(Endpoint::local(fixed), Endpoint::from(fixed));
    }

    #[test]
    fn display() {
        assert_eq!(Endpoint::new("example.org", 8080).to_string(), "example.org:8080");
    }
}
