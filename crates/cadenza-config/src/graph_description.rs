//! Declarative graph files.
//!
//! A graph description names node instances by kind, lists connections as
//! `node:port` pairs, and optionally routes two ports to a stereo sink:
//!
//! ```toml
//! [[nodes]]
//! id = "osc"
//! kind = "oscillator"
//! params = { frequency = 440.0 }
//!
//! [[nodes]]
//! id = "amp"
//! kind = "gain"
//!
//! [[connections]]
//! from = "osc:out"
//! to = "amp:in"
//!
//! [sink]
//! left = "amp:out"
//! right = "amp:out"
//! ```
//!
//! Descriptions are validated structurally here. Node kinds and port names
//! are only known to whoever builds the graph from the description.

use std::collections::HashSet;
use std::path::Path;

use cadenza_core::{NodeId, NodeParams, PortRef};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Instance id.
    pub id: NodeId,
    /// Registered kind to instantiate.
    pub kind: String,
    /// Construction parameters.
    #[serde(default, skip_serializing_if = "NodeParams::is_empty")]
    pub params: NodeParams,
}

/// One connection from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Source `node:port`.
    pub from: PortRef,
    /// Destination `node:port`.
    pub to: PortRef,
}

/// Stereo output routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink node id.
    #[serde(default = "default_sink_id")]
    pub id: NodeId,
    /// Port feeding the left channel.
    pub left: Option<PortRef>,
    /// Port feeding the right channel.
    pub right: Option<PortRef>,
}

fn default_sink_id() -> NodeId {
    NodeId::from("out")
}

/// A complete graph file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphDescription {
    /// Node instances, in insertion order.
    pub nodes: Vec<NodeConfig>,
    /// Connections between node ports.
    pub connections: Vec<ConnectionConfig>,
    /// Optional stereo sink.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkConfig>,
}

impl GraphDescription {
    /// Load and validate a graph file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Save to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let desc: Self = toml::from_str(s)?;
        desc.validate()?;
        Ok(desc)
    }

    /// Check ids are valid and unique and every endpoint names a declared node.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids: HashSet<&NodeId> = HashSet::new();
        for node in &self.nodes {
            if !node.id.is_valid() {
                return Err(ConfigError::InvalidGraph(format!(
                    "invalid node id '{}'",
                    node.id
                )));
            }
            if !ids.insert(&node.id) {
                return Err(ConfigError::InvalidGraph(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        let check = |port: &PortRef| {
            if ids.contains(&port.node) {
                Ok(())
            } else {
                Err(ConfigError::InvalidGraph(format!(
                    "'{port}' refers to undeclared node '{}'",
                    port.node
                )))
            }
        };
        for conn in &self.connections {
            check(&conn.from)?;
            check(&conn.to)?;
        }

        if let Some(sink) = &self.sink {
            if !sink.id.is_valid() || ids.contains(&sink.id) {
                return Err(ConfigError::InvalidGraph(format!(
                    "sink id '{}' is invalid or already used",
                    sink.id
                )));
            }
            for port in sink.left.iter().chain(sink.right.iter()) {
                check(port)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::ParamValue;

    const TONE: &str = r#"
        [[nodes]]
        id = "osc"
        kind = "oscillator"
        params = { frequency = 220.0, waveform = "sine" }

        [[nodes]]
        id = "amp"
        kind = "gain"

        [[connections]]
        from = "osc:out"
        to = "amp:in"

        [sink]
        left = "amp:out"
        right = "osc:out"
    "#;

    #[test]
    fn test_parse_full_description() {
        let desc = GraphDescription::from_toml_str(TONE).unwrap();
        assert_eq!(desc.nodes.len(), 2);
        assert_eq!(
            desc.nodes[0].params.get("frequency"),
            Some(&ParamValue::Float(220.0))
        );
        assert_eq!(
            desc.nodes[0].params.get("waveform"),
            Some(&ParamValue::Text("sine".into()))
        );
        assert!(desc.nodes[1].params.is_empty());
        assert_eq!(desc.connections[0].to, PortRef::new("amp", "in"));

        let sink = desc.sink.unwrap();
        assert_eq!(sink.id.as_str(), "out");
        assert_eq!(sink.left, Some(PortRef::new("amp", "out")));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let toml = r#"
            [[nodes]]
            id = "a"
            kind = "gain"
            [[nodes]]
            id = "a"
            kind = "gain"
        "#;
        let err = GraphDescription::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate node id 'a'"), "{err}");
    }

    #[test]
    fn test_undeclared_endpoint_rejected() {
        let toml = r#"
            [[nodes]]
            id = "a"
            kind = "gain"
            [[connections]]
            from = "a:out"
            to = "b:in"
        "#;
        let err = GraphDescription::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("undeclared node 'b'"), "{err}");
    }

    #[test]
    fn test_malformed_port_is_parse_error() {
        let toml = r#"
            [[connections]]
            from = "nocolon"
            to = "b:in"
        "#;
        let err = GraphDescription::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_sink_id_collision_rejected() {
        let toml = r#"
            [[nodes]]
            id = "out"
            kind = "gain"
            [sink]
            left = "out:out"
        "#;
        assert!(GraphDescription::from_toml_str(toml).is_err());
    }
}
