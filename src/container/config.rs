//! Container configuration

use crate::service::{PortMapping, ServiceDefinition, VolumeMount};
use serde::{Deserialize, Serialize};

/// Label carrying the project name
pub const PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label carrying the service name
pub const SERVICE_LABEL: &str = "com.docker.compose.service";

/// Container status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container is created but not running
    Created,
    /// Container is running
    Running,
    /// Container has exited
    Exited,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Exited => write!(f, "exited"),
        }
    }
}

/// Default container name for a service within a project
pub fn container_name(project: &str, service: &str) -> String {
    format!("{}-{}-1", project, service)
}

/// Everything a runtime needs to launch one service container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Service name, used as the network alias
    pub service: String,
    /// Image name/tag
    pub image: String,
    /// Command override
    pub cmd: Vec<String>,
    /// Environment variables, in declaration order
    pub env: Vec<(String, String)>,
    /// Published ports
    pub ports: Vec<PortMapping>,
    /// Volume mounts
    pub volumes: Vec<VolumeMount>,
    /// Networks to join
    pub networks: Vec<String>,
    /// Container labels
    pub labels: Vec<(String, String)>,
}

impl ContainerSpec {
    /// Build the container spec for a service
    pub fn from_service(project: &str, service: &ServiceDefinition) -> Self {
        let name = service
            .container_name
            .clone()
            .unwrap_or_else(|| container_name(project, &service.name));

        Self {
            name,
            service: service.name.clone(),
            image: service.image.clone(),
            cmd: service.command.clone(),
            env: service.environment.clone(),
            ports: service.ports.clone(),
            volumes: service.volumes.clone(),
            networks: service.networks.clone(),
            labels: vec![
                (PROJECT_LABEL.to_string(), project.to_string()),
                (SERVICE_LABEL.to_string(), service.name.clone()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_from_service() {
        let service = ServiceDefinition::new("database", "mongo:4.0")
            .env("MONGO_INITDB_DATABASE", "flask")
            .network("annotator");
        let spec = ContainerSpec::from_service("annotator", &service);

        assert_eq!(spec.name, "annotator-database-1");
        assert_eq!(spec.service, "database");
        assert_eq!(spec.env, service.environment);
        assert!(spec
            .labels
            .contains(&(SERVICE_LABEL.to_string(), "database".to_string())));
    }

    #[test]
    fn test_explicit_container_name() {
        let mut service = ServiceDefinition::new("webserver", "annotator_webserver");
        service.container_name = Some("annotator_webclient".to_string());
        let spec = ContainerSpec::from_service("annotator", &service);
        assert_eq!(spec.name, "annotator_webclient");
    }
}
