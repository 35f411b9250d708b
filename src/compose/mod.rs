//! Compose file support
//!
//! Reads docker-compose style YAML, resolves variables and turns the result
//! into service, network and volume definitions for the registry.

pub mod config;
pub mod loader;
pub mod parser;

pub use config::{ComposeConfig, ServiceConfig};
pub use loader::{ComposeLoader, ComposeProject};
pub use parser::ComposeParser;
