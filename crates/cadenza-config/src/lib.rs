//! Configuration for the cadenza audio engine.
//!
//! This crate loads and validates the settings shared by the engine, the
//! framed stream, and the command line tool, plus declarative graph files.
//!
//! # Features
//!
//! - **Settings**: Engine and stream settings from `cadenza.toml`
//! - **Graph files**: Node instances, connections, and sink routing in TOML
//! - **Paths**: Platform-specific config and graph directories
//!
//! # Example
//!
//! ```rust,no_run
//! use cadenza_config::{CadenzaConfig, GraphDescription, default_config_path};
//!
//! let config = CadenzaConfig::load_or_default(&default_config_path()).unwrap();
//! let graph = GraphDescription::load("tone.toml".as_ref()).unwrap();
//! println!("{} nodes at {} Hz", graph.nodes.len(), config.engine.sample_rate);
//! ```

mod error;
mod graph_description;
mod settings;

/// Platform-specific paths for configuration and graph files.
pub mod paths;

pub use error::ConfigError;
pub use graph_description::{ConnectionConfig, GraphDescription, NodeConfig, SinkConfig};
pub use paths::{
    default_config_path, ensure_user_config_dir, find_graph, user_config_dir, user_graphs_dir,
};
pub use settings::{CadenzaConfig, EngineSettings, FaultPolicy, StreamSettings};

impl CadenzaConfig {
    /// Load a config file, or return defaults when it does not exist.
    pub fn load_or_default(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
