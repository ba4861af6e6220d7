//! Process identity used to tag the origin of sync messages.

use std::fmt;
use std::net::UdpSocket;

use smol_str::SmolStr;

/// Identity of this process on the invalidation bus.
///
/// Resolved once while wiring the registry and passed by value into
/// every component that publishes or filters messages; there is no lazy
/// global. Two processes sharing a store must resolve distinct values,
/// otherwise they will discard each other's invalidations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeId(SmolStr);

impl NodeId {
    /// Resolve the preferred outbound address of this host.
    ///
    /// Connects a UDP socket toward a non-routable documentation
    /// address to learn which local address the OS would pick for
    /// external traffic; no packets are sent. Hosts without a route
    /// fall back to the loopback address — deployments where that is
    /// ambiguous should configure an explicit `node_id` instead.
    pub fn detect() -> Self {
        let resolved = UdpSocket::bind("0.0.0.0:0")
            .and_then(|socket| {
                socket.connect("198.51.100.1:53")?;
                socket.local_addr()
            })
            .map(|addr| addr.ip());
        match resolved {
            Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => {
                Self(SmolStr::new(ip.to_string()))
            }
            _ => Self(SmolStr::new_static("127.0.0.1")),
        }
    }

    /// The identity as published in sync messages.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(SmolStr::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_is_nonempty() {
        assert!(!NodeId::detect().as_str().is_empty());
    }

    #[test]
    fn explicit_identity() {
        let node = NodeId::from("10.0.0.7");
        assert_eq!(node.as_str(), "10.0.0.7");
        assert_eq!(node.to_string(), "10.0.0.7");
    }
}
