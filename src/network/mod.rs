//! Network management module
//!
//! Networks are provisioned before the first service starts and removed only
//! on teardown.

pub mod config;

pub use config::NetworkDefinition;

use crate::resource::ResourceManager;

/// Manager for the networks of a deployment
pub type NetworkManager = ResourceManager<NetworkDefinition>;
