//! Runtime backends
//!
//! The supervisor never launches anything itself. It drives a [`Runtime`],
//! which starts and probes containers and provisions the networks and
//! volumes they share. Two backends are provided:
//!
//! - [`ContainerManager`](crate::container::ContainerManager): an in-memory
//!   simulated runtime, used for dry runs and tests
//! - [`DockerRuntime`]: drives the `docker` CLI

pub mod docker;

pub use docker::DockerRuntime;

use crate::container::ContainerSpec;
use crate::error::Result;
use crate::storage::VolumeDefinition;
use async_trait::async_trait;
use std::time::Duration;

/// Observed liveness of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Process is running
    Running,
    /// Process exited with the given code
    Exited(i32),
    /// No such container
    Missing,
}

/// Backend that runs containers and owns networks and volumes
#[async_trait]
pub trait Runtime: Send + Sync + 'static {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Launch a container, replacing any stale one with the same name.
    /// Returns the container ID.
    async fn launch(&self, spec: &ContainerSpec) -> Result<String>;

    /// Current liveness of a container
    async fn status(&self, container: &str) -> Result<Liveness>;

    /// Run a command inside a container and return its exit code
    async fn exec(&self, container: &str, command: &[String]) -> Result<i32>;

    /// Stop a container, giving it `grace` to exit before the backend kills it
    async fn stop(&self, container: &str, grace: Duration) -> Result<()>;

    /// Kill a container immediately
    async fn kill(&self, container: &str) -> Result<()>;

    /// Remove a stopped container
    async fn remove(&self, container: &str) -> Result<()>;

    async fn network_exists(&self, name: &str) -> Result<bool>;

    async fn create_network(&self, name: &str) -> Result<()>;

    async fn remove_network(&self, name: &str) -> Result<()>;

    async fn volume_exists(&self, name: &str) -> Result<bool>;

    async fn create_volume(&self, volume: &VolumeDefinition) -> Result<()>;

    async fn remove_volume(&self, name: &str) -> Result<()>;
}
