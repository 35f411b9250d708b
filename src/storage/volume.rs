//! Volume definitions

use crate::error::Result;
use crate::resource::ManagedResource;
use crate::runtime::Runtime;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent volume shared by services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDefinition {
    /// Volume name
    pub name: String,
    /// Assumed to pre-exist; never created or removed
    pub external: bool,
    /// Host directory backing the volume
    pub host_path: Option<PathBuf>,
}

impl VolumeDefinition {
    /// Create a managed volume definition
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            external: false,
            host_path: None,
        }
    }

    /// Set external
    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    /// Bind the volume to a host directory
    pub fn host_path(mut self, path: &Path) -> Self {
        self.host_path = Some(path.to_path_buf());
        self
    }
}

#[async_trait]
impl ManagedResource for VolumeDefinition {
    const KIND: &'static str = "volume";

    fn name(&self) -> &str {
        &self.name
    }

    fn is_external(&self) -> bool {
        self.external
    }

    async fn exists(&self, runtime: &dyn Runtime) -> Result<bool> {
        runtime.volume_exists(&self.name).await
    }

    async fn create(&self, runtime: &dyn Runtime) -> Result<()> {
        runtime.create_volume(self).await
    }

    async fn remove(&self, runtime: &dyn Runtime) -> Result<()> {
        runtime.remove_volume(&self.name).await
    }
}
