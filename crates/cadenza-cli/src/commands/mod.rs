//! CLI command implementations.

pub mod common;
pub mod compile;
pub mod devices;
pub mod nodes;
pub mod render;
pub mod run;
pub mod serve;
