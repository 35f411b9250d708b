//! Compose file configuration types
//!
//! Only the keys the supervisor acts on are modelled; everything else in a
//! compose file is ignored. Maps are [`IndexMap`]s so services keep the
//! order they were declared in.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Compose file configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Compose file version (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Project name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Services
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,
    /// Networks
    #[serde(default)]
    pub networks: IndexMap<String, Option<NetworkConfig>>,
    /// Volumes
    #[serde(default)]
    pub volumes: IndexMap<String, Option<VolumeConfig>>,
}

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Image name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Build configuration; building images is not supported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<serde_yaml::Value>,
    /// Command to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandConfig>,
    /// Container name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentConfig>,
    /// Port mappings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortConfig>>,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<VolumeMountConfig>>,
    /// Networks to connect to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<NetworksConfig>,
    /// Service dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOnConfig>,
    /// Restart policy (`no`, `always`, `on-failure[:N]`, `unless-stopped`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    /// Healthcheck configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthcheckConfig>,
    /// Stop grace period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_grace_period: Option<String>,
    /// Deploy configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
}

impl ServiceConfig {
    /// Names of the services this one depends on, in declaration order
    pub fn dependencies(&self) -> Vec<String> {
        match &self.depends_on {
            None => Vec::new(),
            Some(DependsOnConfig::Array(names)) => names.clone(),
            Some(DependsOnConfig::Map(map)) => map.keys().cloned().collect(),
        }
    }

    /// Names of the networks this service joins, in declaration order
    pub fn network_names(&self) -> Vec<String> {
        match &self.networks {
            None => Vec::new(),
            Some(NetworksConfig::Array(names)) => names.clone(),
            Some(NetworksConfig::Map(map)) => map.keys().cloned().collect(),
        }
    }
}

/// Command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    /// Shell command string
    Shell(String),
    /// Exec form array
    Exec(Vec<String>),
}

/// Environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentConfig {
    /// Array of `KEY=value` or bare `KEY` strings
    Array(Vec<String>),
    /// Map of key to scalar value; null passes the variable through
    Map(IndexMap<String, Option<serde_yaml::Value>>),
}

/// Port number given as a number or a string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortNumber {
    Number(u16),
    Text(String),
}

/// Port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortConfig {
    /// Bare container port: `80`
    Number(u16),
    /// Short syntax: `"8080:80"`, `"127.0.0.1:8080:80/udp"`
    Short(String),
    /// Long syntax
    Long(PortConfigLong),
}

/// Long port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfigLong {
    /// Target port in container
    pub target: u16,
    /// Published port on host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<PortNumber>,
    /// Protocol (tcp/udp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Volume mount configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeMountConfig {
    /// Short syntax: `"source:target[:ro]"`
    Short(String),
    /// Long syntax
    Long(VolumeMountLong),
}

/// Long volume mount configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMountLong {
    /// Mount type (`volume` or `bind`)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mount_type: Option<String>,
    /// Source path or volume name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Target path in container
    pub target: String,
    /// Read only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

/// Networks configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworksConfig {
    /// Array of network names
    Array(Vec<String>),
    /// Map of network name to per-service options
    Map(IndexMap<String, Option<serde_yaml::Value>>),
}

/// Depends on configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOnConfig {
    /// Array of service names
    Array(Vec<String>),
    /// Map of service to condition
    Map(IndexMap<String, DependsOnCondition>),
}

/// Depends on condition
///
/// Every condition is treated as `service_healthy`: a dependency counts once
/// it reaches `Running`, which already requires its health signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependsOnCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Deploy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Restart policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicyConfig>,
}

/// Restart policy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestartPolicyConfig {
    /// Condition (`none`, `on-failure`, `any`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Delay between restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
    /// Maximum attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// Healthcheck configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    /// Test command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<HealthcheckTest>,
    /// Interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Timeout of one probe (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Start period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
    /// Disable healthcheck
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
}

/// Healthcheck test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthcheckTest {
    /// Command string, run with a shell
    Command(String),
    /// `["CMD", ...]`, `["CMD-SHELL", "..."]` or `["NONE"]`
    Array(Vec<String>),
}

/// Network configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// External network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalConfig>,
    /// Name on the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Volume configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options; `device` binds the volume to a host directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_opts: Option<IndexMap<String, String>>,
    /// External volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalConfig>,
    /// Name on the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// External resource configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalConfig {
    /// Boolean
    Bool(bool),
    /// With name
    Named { name: String },
}

impl ExternalConfig {
    pub fn is_external(&self) -> bool {
        match self {
            ExternalConfig::Bool(external) => *external,
            ExternalConfig::Named { .. } => true,
        }
    }

    /// Runtime name given by the legacy `external: { name }` form
    pub fn name(&self) -> Option<&str> {
        match self {
            ExternalConfig::Named { name } => Some(name),
            ExternalConfig::Bool(_) => None,
        }
    }
}

/// Resolve the runtime name and external flag of a top-level resource
pub(crate) fn resource_identity(
    key: &str,
    name: Option<&str>,
    external: Option<&ExternalConfig>,
) -> (String, bool) {
    let resolved = name
        .or_else(|| external.and_then(ExternalConfig::name))
        .unwrap_or(key)
        .to_string();
    (resolved, external.is_some_and(ExternalConfig::is_external))
}

impl NetworkConfig {
    pub(crate) fn identity(&self, key: &str) -> (String, bool) {
        resource_identity(key, self.name.as_deref(), self.external.as_ref())
    }
}

impl VolumeConfig {
    pub(crate) fn identity(&self, key: &str) -> (String, bool) {
        resource_identity(key, self.name.as_deref(), self.external.as_ref())
    }

    /// Host directory from `driver_opts.device`
    pub fn device(&self) -> Option<&str> {
        self.driver_opts
            .as_ref()
            .and_then(|opts| opts.get("device"))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_keep_declaration_order() {
        let yaml = r#"
services:
  webserver:
    image: annotator_webserver
  database:
    image: mongo:4.0
  messageq:
    image: rabbitmq:3
"#;
        let config: ComposeConfig = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<&str> = config.services.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["webserver", "database", "messageq"]);
    }

    #[test]
    fn test_depends_on_forms() {
        let yaml = r#"
services:
  a:
    image: a
    depends_on: [b, c]
  b:
    image: b
    depends_on:
      c:
        condition: service_healthy
  c:
    image: c
"#;
        let config: ComposeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.services["a"].dependencies(), vec!["b", "c"]);
        assert_eq!(config.services["b"].dependencies(), vec!["c"]);
        assert!(config.services["c"].dependencies().is_empty());
    }

    #[test]
    fn test_resource_identity() {
        let yaml = r#"
networks:
  annotator:
  shared:
    external: true
    name: company_shared
  legacy:
    external:
      name: old_net
volumes:
  mongodb_data: { external: true }
  datasets:
    driver_opts:
      type: none
      o: bind
      device: /srv/datasets
"#;
        let config: ComposeConfig = serde_yaml::from_str(yaml).unwrap();
        let network = |key: &str| {
            config.networks[key]
                .clone()
                .unwrap_or_default()
                .identity(key)
        };

        assert_eq!(network("annotator"), ("annotator".to_string(), false));
        assert_eq!(network("shared"), ("company_shared".to_string(), true));
        assert_eq!(network("legacy"), ("old_net".to_string(), true));

        let datasets = config.volumes["datasets"].clone().unwrap();
        assert_eq!(datasets.device(), Some("/srv/datasets"));
        let mongo = config.volumes["mongodb_data"].clone().unwrap();
        assert_eq!(mongo.identity("mongodb_data"), ("mongodb_data".to_string(), true));
    }
}
