//! Network definitions

use crate::error::Result;
use crate::resource::ManagedResource;
use crate::runtime::Runtime;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Network shared by several services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    /// Network name
    pub name: String,
    /// Assumed to pre-exist; never created or removed
    pub external: bool,
}

impl NetworkDefinition {
    /// Create a managed network definition
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            external: false,
        }
    }

    /// Set external
    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }
}

#[async_trait]
impl ManagedResource for NetworkDefinition {
    const KIND: &'static str = "network";

    fn name(&self) -> &str {
        &self.name
    }

    fn is_external(&self) -> bool {
        self.external
    }

    async fn exists(&self, runtime: &dyn Runtime) -> Result<bool> {
        runtime.network_exists(&self.name).await
    }

    async fn create(&self, runtime: &dyn Runtime) -> Result<()> {
        runtime.create_network(&self.name).await
    }

    async fn remove(&self, runtime: &dyn Runtime) -> Result<()> {
        runtime.remove_network(&self.name).await
    }
}
