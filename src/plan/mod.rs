//! Deployment plans
//!
//! A [`DeploymentPlan`] is derived once per deployment by the
//! [`DependencyGraph`] and consumed by the supervisor. A re-deploy builds a
//! new one.

pub mod graph;

pub use graph::DependencyGraph;

use crate::network::NetworkDefinition;
use crate::service::ServiceDefinition;
use crate::storage::VolumeDefinition;

/// Ordered, immutable deployment plan
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    services: Vec<ServiceDefinition>,
    networks: Vec<NetworkDefinition>,
    volumes: Vec<VolumeDefinition>,
}

impl DeploymentPlan {
    pub(crate) fn new(
        services: Vec<ServiceDefinition>,
        networks: Vec<NetworkDefinition>,
        volumes: Vec<VolumeDefinition>,
    ) -> Self {
        Self {
            services,
            networks,
            volumes,
        }
    }

    /// Services in start order
    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    /// Iterate services in start order
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.iter()
    }

    /// Service names in start order
    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    /// Position of a service in the start order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.services.iter().position(|s| s.name == name)
    }

    /// Services that declare a dependency on `name`
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.services
            .iter()
            .filter(|s| s.depends_on.iter().any(|d| d == name))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Networks the deployment needs
    pub fn networks(&self) -> &[NetworkDefinition] {
        &self.networks
    }

    /// Volumes the deployment needs
    pub fn volumes(&self) -> &[VolumeDefinition] {
        &self.volumes
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Take the plan apart
    pub fn into_parts(
        self,
    ) -> (
        Vec<ServiceDefinition>,
        Vec<NetworkDefinition>,
        Vec<VolumeDefinition>,
    ) {
        (self.services, self.networks, self.volumes)
    }
}
