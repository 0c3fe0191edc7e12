//! Port addressing and connections.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

use super::GraphError;

/// Address of one port: `node:port`.
///
/// The node id is everything before the first `:`; the port name is the rest
/// and may itself contain `:` (e.g. `sink:in:left`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRef {
    /// Owning node.
    pub node: NodeId,
    /// Port name on that node.
    pub port: String,
}

impl PortRef {
    /// Creates a port reference.
    pub fn new(node: impl Into<NodeId>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }

    /// Name of the buffer the compiler allocates for this port.
    pub fn buffer_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

impl FromStr for PortRef {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((node, port)) if !node.is_empty() && !port.is_empty() => {
                Ok(Self::new(node, port))
            }
            _ => Err(GraphError::InvalidPortRef(s.to_owned())),
        }
    }
}

impl TryFrom<String> for PortRef {
    type Error = GraphError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PortRef> for String {
    fn from(p: PortRef) -> Self {
        p.to_string()
    }
}

/// A directed connection from an output port to an input port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Upstream output port.
    pub from: PortRef,
    /// Downstream input port.
    pub to: PortRef,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_ref() {
        let p: PortRef = "osc:out".parse().unwrap();
        assert_eq!(p.node.as_str(), "osc");
        assert_eq!(p.port, "out");

        let nested: PortRef = "master:in:left".parse().unwrap();
        assert_eq!(nested.node.as_str(), "master");
        assert_eq!(nested.port, "in:left");
        assert_eq!(nested.to_string(), "master:in:left");
    }

    #[test]
    fn test_parse_port_ref_invalid() {
        for bad in ["osc", ":out", "osc:", ""] {
            assert!(
                matches!(bad.parse::<PortRef>(), Err(GraphError::InvalidPortRef(_))),
                "{bad} should be rejected"
            );
        }
    }
}
