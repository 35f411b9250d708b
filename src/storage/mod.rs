//! Storage management module
//!
//! Named volumes outlive service restarts; they are removed only on teardown
//! and only when not external.

pub mod volume;

pub use volume::VolumeDefinition;

use crate::resource::ResourceManager;

/// Manager for the volumes of a deployment
pub type VolumeManager = ResourceManager<VolumeDefinition>;
