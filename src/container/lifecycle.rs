//! Simulated container runtime
//!
//! Keeps containers, networks and volumes in memory. Volumes get a real
//! directory under the base path so bind-style data survives restarts.
//! Faults can be injected per container name to exercise the supervisor's
//! restart and teardown paths.

use super::config::{ContainerSpec, ContainerStatus};
use super::runtime::Container;
use crate::error::{ConvoyError, Result};
use crate::runtime::{Liveness, Runtime};
use crate::storage::VolumeDefinition;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Something the simulated runtime did, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Launched(String),
    Stopped(String),
    Killed(String),
    Removed(String),
    NetworkCreated(String),
    NetworkRemoved(String),
    VolumeCreated(String),
    VolumeRemoved(String),
}

#[derive(Debug, Default)]
struct Faults {
    /// Remaining launches that fail, per container
    launch_failures: HashMap<String, u32>,
    /// Containers whose health command fails
    unhealthy: HashSet<String>,
    /// Containers that exit right after launch, with the given code
    exit_on_launch: HashMap<String, i32>,
    /// Containers that ignore stop requests
    ignore_stop: HashSet<String>,
}

/// In-memory runtime
pub struct ContainerManager {
    /// All containers indexed by name
    containers: RwLock<HashMap<String, Container>>,
    /// Existing networks
    networks: RwLock<HashSet<String>>,
    /// Existing volumes and their data directory
    volumes: RwLock<HashMap<String, PathBuf>>,
    faults: RwLock<Faults>,
    events: RwLock<Vec<RuntimeEvent>>,
    /// Base path for volume storage
    base_path: PathBuf,
}

impl ContainerManager {
    /// Create a new simulated runtime storing volume data under `base_path`
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;

        Ok(Self {
            containers: RwLock::new(HashMap::new()),
            networks: RwLock::new(HashSet::new()),
            volumes: RwLock::new(HashMap::new()),
            faults: RwLock::new(Faults::default()),
            events: RwLock::new(Vec::new()),
            base_path,
        })
    }

    /// Make the next `count` launches of a container fail
    pub fn fail_launches(&self, container: &str, count: u32) -> Result<()> {
        write(&self.faults)?
            .launch_failures
            .insert(container.to_string(), count);
        Ok(())
    }

    /// Make a container's health command fail or pass
    pub fn set_unhealthy(&self, container: &str, unhealthy: bool) -> Result<()> {
        let mut faults = write(&self.faults)?;
        if unhealthy {
            faults.unhealthy.insert(container.to_string());
        } else {
            faults.unhealthy.remove(container);
        }
        Ok(())
    }

    /// Make every launch of a container exit immediately with `code`
    pub fn exit_on_launch(&self, container: &str, code: i32) -> Result<()> {
        write(&self.faults)?
            .exit_on_launch
            .insert(container.to_string(), code);
        Ok(())
    }

    /// Make a container ignore graceful stop requests
    pub fn ignore_stop(&self, container: &str) -> Result<()> {
        write(&self.faults)?.ignore_stop.insert(container.to_string());
        Ok(())
    }

    /// Simulate the container process exiting
    pub fn exit(&self, container: &str, code: i32) -> Result<()> {
        let mut containers = write(&self.containers)?;
        let c = containers
            .get_mut(container)
            .ok_or_else(|| ConvoyError::NotFound(container.to_string()))?;
        c.exit(code);
        Ok(())
    }

    /// Get a container by name
    pub fn get(&self, container: &str) -> Result<Container> {
        read(&self.containers)?
            .get(container)
            .cloned()
            .ok_or_else(|| ConvoyError::NotFound(container.to_string()))
    }

    /// List all containers
    pub fn list(&self) -> Result<Vec<Container>> {
        Ok(read(&self.containers)?.values().cloned().collect())
    }

    /// Get running container count
    pub fn running_count(&self) -> Result<usize> {
        let count = read(&self.containers)?
            .values()
            .filter(|c| c.status == ContainerStatus::Running)
            .count();
        Ok(count)
    }

    /// Everything the runtime did so far
    pub fn events(&self) -> Result<Vec<RuntimeEvent>> {
        Ok(read(&self.events)?.clone())
    }

    /// Data directory of a volume
    pub fn volume_path(&self, name: &str) -> Result<PathBuf> {
        read(&self.volumes)?
            .get(name)
            .cloned()
            .ok_or_else(|| ConvoyError::NotFound(name.to_string()))
    }

    fn record(&self, event: RuntimeEvent) -> Result<()> {
        write(&self.events)?.push(event);
        Ok(())
    }
}

#[async_trait]
impl Runtime for ContainerManager {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<String> {
        let exit_code = {
            let mut faults = write(&self.faults)?;
            if let Some(remaining) = faults.launch_failures.get_mut(&spec.name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ConvoyError::Runtime(format!(
                        "failed to launch {}",
                        spec.name
                    )));
                }
            }
            faults.exit_on_launch.get(&spec.name).copied()
        };

        for network in &spec.networks {
            if !read(&self.networks)?.contains(network) {
                return Err(ConvoyError::Runtime(format!(
                    "network {} not found",
                    network
                )));
            }
        }

        let mut container = Container::new(spec.clone());
        container.start()?;
        if let Some(code) = exit_code {
            container.exit(code);
        }
        let id = container.id.clone();

        write(&self.containers)?.insert(spec.name.clone(), container);
        self.record(RuntimeEvent::Launched(spec.name.clone()))?;

        Ok(id)
    }

    async fn status(&self, container: &str) -> Result<Liveness> {
        let containers = read(&self.containers)?;
        let liveness = match containers.get(container) {
            None => Liveness::Missing,
            Some(c) if c.is_running() => Liveness::Running,
            Some(c) => Liveness::Exited(c.exit_code.unwrap_or(0)),
        };
        Ok(liveness)
    }

    async fn exec(&self, container: &str, _command: &[String]) -> Result<i32> {
        if !read(&self.containers)?
            .get(container)
            .is_some_and(Container::is_running)
        {
            return Err(ConvoyError::Runtime(format!(
                "container {} is not running",
                container
            )));
        }

        let code = if read(&self.faults)?.unhealthy.contains(container) {
            1
        } else {
            0
        };
        Ok(code)
    }

    async fn stop(&self, container: &str, _grace: Duration) -> Result<()> {
        let ignored = read(&self.faults)?.ignore_stop.contains(container);
        if ignored {
            std::future::pending::<()>().await;
        }

        {
            let mut containers = write(&self.containers)?;
            let c = containers
                .get_mut(container)
                .ok_or_else(|| ConvoyError::NotFound(container.to_string()))?;
            if c.is_running() {
                c.stop()?;
            }
        }
        self.record(RuntimeEvent::Stopped(container.to_string()))
    }

    async fn kill(&self, container: &str) -> Result<()> {
        {
            let mut containers = write(&self.containers)?;
            let c = containers
                .get_mut(container)
                .ok_or_else(|| ConvoyError::NotFound(container.to_string()))?;
            c.kill();
        }
        self.record(RuntimeEvent::Killed(container.to_string()))
    }

    async fn remove(&self, container: &str) -> Result<()> {
        {
            let mut containers = write(&self.containers)?;
            if containers.get(container).is_some_and(Container::is_running) {
                return Err(ConvoyError::Runtime(format!(
                    "cannot remove running container {}",
                    container
                )));
            }
            containers.remove(container);
        }
        self.record(RuntimeEvent::Removed(container.to_string()))
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        Ok(read(&self.networks)?.contains(name))
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        if !write(&self.networks)?.insert(name.to_string()) {
            return Err(ConvoyError::Runtime(format!(
                "network {} already exists",
                name
            )));
        }
        self.record(RuntimeEvent::NetworkCreated(name.to_string()))
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        let in_use = read(&self.containers)?
            .values()
            .any(|c| c.is_running() && c.spec.networks.iter().any(|n| n == name));
        if in_use {
            return Err(ConvoyError::Runtime(format!(
                "network {} has active endpoints",
                name
            )));
        }

        if !write(&self.networks)?.remove(name) {
            return Err(ConvoyError::NotFound(name.to_string()));
        }
        self.record(RuntimeEvent::NetworkRemoved(name.to_string()))
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        Ok(read(&self.volumes)?.contains_key(name))
    }

    async fn create_volume(&self, volume: &VolumeDefinition) -> Result<()> {
        let path = volume
            .host_path
            .clone()
            .unwrap_or_else(|| self.base_path.join("volumes").join(&volume.name));
        std::fs::create_dir_all(&path)?;

        write(&self.volumes)?.insert(volume.name.clone(), path);
        self.record(RuntimeEvent::VolumeCreated(volume.name.clone()))
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let path = write(&self.volumes)?
            .remove(name)
            .ok_or_else(|| ConvoyError::NotFound(name.to_string()))?;

        // Host-bound volumes keep their data
        if path.starts_with(&self.base_path) && path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        self.record(RuntimeEvent::VolumeRemoved(name.to_string()))
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| ConvoyError::Lock("Failed to acquire read lock".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| ConvoyError::Lock("Failed to acquire write lock".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceDefinition;
    use tempfile::tempdir;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec::from_service("test", &ServiceDefinition::new(name, "image"))
    }

    #[tokio::test]
    async fn test_launch_and_stop() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();

        runtime.launch(&spec("db")).await.unwrap();
        assert_eq!(runtime.status("test-db-1").await.unwrap(), Liveness::Running);
        assert_eq!(runtime.running_count().unwrap(), 1);

        runtime
            .stop("test-db-1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            runtime.status("test-db-1").await.unwrap(),
            Liveness::Exited(0)
        );

        runtime.remove("test-db-1").await.unwrap();
        assert_eq!(runtime.status("test-db-1").await.unwrap(), Liveness::Missing);
    }

    #[tokio::test]
    async fn test_injected_launch_failures() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();
        runtime.fail_launches("test-db-1", 1).unwrap();

        assert!(runtime.launch(&spec("db")).await.is_err());
        assert!(runtime.launch(&spec("db")).await.is_ok());
    }

    #[tokio::test]
    async fn test_launch_requires_network() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();
        let with_net = ContainerSpec::from_service(
            "test",
            &ServiceDefinition::new("db", "image").network("backend"),
        );

        assert!(runtime.launch(&with_net).await.is_err());
        runtime.create_network("backend").await.unwrap();
        assert!(runtime.launch(&with_net).await.is_ok());
        assert!(runtime.remove_network("backend").await.is_err());
    }

    #[tokio::test]
    async fn test_volume_directories() {
        let temp = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();

        runtime
            .create_volume(&VolumeDefinition::new("mongodb_data"))
            .await
            .unwrap();
        let path = runtime.volume_path("mongodb_data").unwrap();
        assert!(path.exists());

        runtime.remove_volume("mongodb_data").await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_host_bound_volume_keeps_data() {
        let temp = tempdir().unwrap();
        let host = tempdir().unwrap();
        let runtime = ContainerManager::new(temp.path().to_path_buf()).unwrap();
        let datasets = host.path().join("datasets");

        runtime
            .create_volume(&VolumeDefinition::new("datasets").host_path(&datasets))
            .await
            .unwrap();
        runtime.remove_volume("datasets").await.unwrap();
        assert!(datasets.exists());
    }
}
