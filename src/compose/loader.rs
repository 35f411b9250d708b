//! Compose file to service registry

use super::config::{
    CommandConfig, ComposeConfig, EnvironmentConfig, HealthcheckConfig, HealthcheckTest,
    PortConfig, PortNumber, ServiceConfig, VolumeMountConfig,
};
use super::parser::{is_volume_name, parse_duration, ComposeParser};
use crate::error::{ConvoyError, Result};
use crate::network::NetworkDefinition;
use crate::service::{
    HealthCheck, MountSource, PortMapping, Protocol, RestartPolicy, ServiceDefinition,
    ServiceRegistry, VolumeMount,
};
use crate::storage::VolumeDefinition;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the network services join when they list none
const DEFAULT_NETWORK: &str = "default";

/// Compose defaults for `healthcheck.interval` and `healthcheck.retries`
const COMPOSE_HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const COMPOSE_HEALTH_RETRIES: u32 = 3;

/// A loaded compose project
#[derive(Debug, Clone)]
pub struct ComposeProject {
    /// Project name
    pub name: String,
    /// Merged and interpolated configuration
    pub config: ComposeConfig,
    /// Definitions built from the configuration
    pub registry: ServiceRegistry,
    /// Validation warnings
    pub warnings: Vec<String>,
}

/// Builds service, network and volume definitions from compose files
pub struct ComposeLoader {
    working_dir: PathBuf,
    env: HashMap<String, String>,
    project: Option<String>,
}

impl ComposeLoader {
    /// Loader resolving relative paths against `working_dir`, with variables
    /// from `working_dir/.env` overridden by the process environment
    pub fn new(working_dir: &Path) -> Result<Self> {
        let mut env = read_env_file(&working_dir.join(".env"))?;
        env.extend(std::env::vars());

        Ok(Self {
            working_dir: working_dir.to_path_buf(),
            env,
            project: None,
        })
    }

    /// Loader with an explicit variable set
    pub fn with_env(working_dir: &Path, env: HashMap<String, String>) -> Self {
        Self {
            working_dir: working_dir.to_path_buf(),
            env,
            project: None,
        }
    }

    /// Override the project name
    pub fn project_name(mut self, name: Option<String>) -> Self {
        self.project = name;
        self
    }

    /// Parse, merge, interpolate and load compose files
    pub fn load_files(&self, files: &[PathBuf]) -> Result<ComposeProject> {
        let config = ComposeParser::parse_files(files)?;
        self.load_config(config)
    }

    /// Interpolate and load a compose document
    pub fn load_str(&self, content: &str) -> Result<ComposeProject> {
        self.load_config(ComposeParser::parse_str(content)?)
    }

    fn load_config(&self, mut config: ComposeConfig) -> Result<ComposeProject> {
        ComposeParser::interpolate(&mut config, &self.env)?;
        let warnings = ComposeParser::validate(&config)?;
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        let name = self.resolve_project_name(&config);
        let registry = self.load(&name, &config)?;

        Ok(ComposeProject {
            name,
            config,
            registry,
            warnings,
        })
    }

    fn resolve_project_name(&self, config: &ComposeConfig) -> String {
        let raw = self
            .project
            .clone()
            .or_else(|| self.env.get("COMPOSE_PROJECT_NAME").cloned())
            .or_else(|| config.name.clone())
            .or_else(|| {
                self.working_dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        let normalized = normalize_project_name(&raw);
        if normalized.is_empty() {
            "default".to_string()
        } else {
            normalized
        }
    }

    /// Build the registry for an interpolated, validated configuration
    pub fn load(&self, project: &str, config: &ComposeConfig) -> Result<ServiceRegistry> {
        let mut registry = ServiceRegistry::new();

        let mut networks = HashMap::new();
        for (key, network) in &config.networks {
            let (name, external) = network.clone().unwrap_or_default().identity(key);
            registry.register_network(NetworkDefinition::new(&name).external(external))?;
            networks.insert(key.clone(), name);
        }

        let mut volumes = HashMap::new();
        for (key, volume) in &config.volumes {
            let volume = volume.clone().unwrap_or_default();
            let (name, external) = volume.identity(key);
            let mut definition = VolumeDefinition::new(&name).external(external);
            if let Some(device) = volume.device() {
                definition = definition.host_path(&self.resolve_path(device));
            }
            registry.register_volume(definition)?;
            volumes.insert(key.clone(), name);
        }

        let default_network = format!("{}_{}", project, DEFAULT_NETWORK);
        let mut uses_default = false;

        for (name, service) in &config.services {
            let mut definition = self.service(name, service, &volumes)?;

            let mut joined = service.network_names();
            if joined.is_empty() {
                joined.push(DEFAULT_NETWORK.to_string());
            }
            for key in joined {
                let network = match networks.get(&key) {
                    Some(resolved) => resolved.clone(),
                    None if key == DEFAULT_NETWORK => {
                        uses_default = true;
                        default_network.clone()
                    }
                    None => key,
                };
                definition.networks.push(network);
            }

            registry.register(definition)?;
        }

        if uses_default {
            registry.register_network(NetworkDefinition::new(&default_network))?;
        }

        tracing::debug!(
            "Loaded project {} with {} services",
            project,
            registry.len()
        );
        Ok(registry)
    }

    fn service(
        &self,
        name: &str,
        service: &ServiceConfig,
        volumes: &HashMap<String, String>,
    ) -> Result<ServiceDefinition> {
        let image = service.image.as_deref().ok_or_else(|| {
            ConvoyError::ComposeParse(format!("Service '{}': 'image' is required", name))
        })?;
        let mut definition = ServiceDefinition::new(name, image);

        definition.container_name = service.container_name.clone();
        definition.command = match &service.command {
            Some(CommandConfig::Exec(args)) => args.clone(),
            Some(CommandConfig::Shell(command)) => split_command(command)?,
            None => Vec::new(),
        };
        definition.environment = self.environment(service.environment.as_ref())?;
        definition.depends_on = service.dependencies();

        for port in service.ports.iter().flatten() {
            definition.ports.push(parse_port(port)?);
        }

        for mount in service.volumes.iter().flatten() {
            if let Some(mount) = self.volume_mount(name, mount, volumes)? {
                definition.volumes.push(mount);
            }
        }

        self.apply_restart(&mut definition, service)?;

        if let Some(healthcheck) = &service.healthcheck {
            apply_healthcheck(&mut definition, healthcheck)?;
        }

        if let Some(grace) = &service.stop_grace_period {
            definition.stop_grace_period = Some(parse_duration(grace)?);
        }

        Ok(definition)
    }

    /// Environment in declaration order; bare keys pass through from the
    /// loader's variables and are dropped when unset
    fn environment(&self, environment: Option<&EnvironmentConfig>) -> Result<Vec<(String, String)>> {
        let mut result = Vec::new();

        match environment {
            None => {}
            Some(EnvironmentConfig::Array(items)) => {
                for item in items {
                    match item.split_once('=') {
                        Some((key, value)) => result.push((key.to_string(), value.to_string())),
                        None => self.pass_through(item, &mut result),
                    }
                }
            }
            Some(EnvironmentConfig::Map(map)) => {
                for (key, value) in map {
                    match value {
                        None => self.pass_through(key, &mut result),
                        Some(value) => result.push((key.clone(), scalar(key, value)?)),
                    }
                }
            }
        }

        Ok(result)
    }

    fn pass_through(&self, key: &str, result: &mut Vec<(String, String)>) {
        match self.env.get(key) {
            Some(value) => result.push((key.to_string(), value.clone())),
            None => tracing::debug!("{} is not set; leaving it out", key),
        }
    }

    fn apply_restart(&self, definition: &mut ServiceDefinition, service: &ServiceConfig) -> Result<()> {
        let policy = service
            .deploy
            .as_ref()
            .and_then(|deploy| deploy.restart_policy.as_ref());

        match &service.restart {
            Some(restart) => {
                let (restart, max) = parse_restart(restart)?;
                definition.restart = restart;
                definition.max_restarts = max;
            }
            None => {
                if let Some(condition) = policy.and_then(|p| p.condition.as_deref()) {
                    definition.restart = match condition {
                        "none" => RestartPolicy::Never,
                        "on-failure" => RestartPolicy::OnFailure,
                        "any" => RestartPolicy::Always,
                        other => {
                            return Err(ConvoyError::InvalidConfig(format!(
                                "Service '{}': unknown restart condition '{}'",
                                definition.name, other
                            )))
                        }
                    };
                }
            }
        }

        if let Some(policy) = policy {
            if let Some(max) = policy.max_attempts {
                definition.max_restarts = Some(max);
            }
            if let Some(delay) = &policy.delay {
                definition.restart_delay = Some(parse_duration(delay)?);
            }
        }

        Ok(())
    }

    fn volume_mount(
        &self,
        service: &str,
        mount: &VolumeMountConfig,
        volumes: &HashMap<String, String>,
    ) -> Result<Option<VolumeMount>> {
        let (source, target, read_only) = match mount {
            VolumeMountConfig::Short(spec) => {
                let parts: Vec<&str> = spec.split(':').collect();
                match parts.as_slice() {
                    [_target] => {
                        tracing::warn!(
                            "Service '{}': anonymous volume '{}' is not supported; skipping",
                            service,
                            spec
                        );
                        return Ok(None);
                    }
                    [source, target] => (source.to_string(), target.to_string(), false),
                    [source, target, mode] => (
                        source.to_string(),
                        target.to_string(),
                        mode.split(',').any(|m| m == "ro"),
                    ),
                    _ => {
                        return Err(ConvoyError::InvalidConfig(format!(
                            "Service '{}': invalid volume '{}'",
                            service, spec
                        )))
                    }
                }
            }
            VolumeMountConfig::Long(long) => {
                let Some(source) = long.source.clone() else {
                    tracing::warn!(
                        "Service '{}': volume without source at {} is not supported; skipping",
                        service,
                        long.target
                    );
                    return Ok(None);
                };
                if let Some(kind) = long.mount_type.as_deref() {
                    if kind != "volume" && kind != "bind" {
                        return Err(ConvoyError::InvalidConfig(format!(
                            "Service '{}': unsupported mount type '{}'",
                            service, kind
                        )));
                    }
                }
                (source, long.target.clone(), long.read_only.unwrap_or(false))
            }
        };

        let source = if is_volume_name(&source) {
            MountSource::Named(volumes.get(&source).cloned().unwrap_or(source))
        } else {
            MountSource::Bind(self.resolve_path(&source))
        };

        Ok(Some(VolumeMount {
            source,
            container_path: target,
            read_only,
        }))
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }

        let path = Path::new(path);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        };

        // Lexical cleanup so "./database" shows up as ".../database"
        joined
            .components()
            .filter(|c| !matches!(c, std::path::Component::CurDir))
            .collect()
    }
}

fn normalize_project_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn scalar(key: &str, value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        _ => Err(ConvoyError::InvalidConfig(format!(
            "environment variable {} must be a scalar",
            key
        ))),
    }
}

/// Parse `restart:`; `on-failure:N` also caps the restart count
pub fn parse_restart(value: &str) -> Result<(RestartPolicy, Option<u32>)> {
    match value {
        "no" | "" => Ok((RestartPolicy::Never, None)),
        "always" | "unless-stopped" => Ok((RestartPolicy::Always, None)),
        "on-failure" => Ok((RestartPolicy::OnFailure, None)),
        other => match other.strip_prefix("on-failure:") {
            Some(max) => {
                let max = max.parse().map_err(|_| {
                    ConvoyError::InvalidConfig(format!("invalid restart policy '{}'", value))
                })?;
                Ok((RestartPolicy::OnFailure, Some(max)))
            }
            None => Err(ConvoyError::InvalidConfig(format!(
                "invalid restart policy '{}'",
                value
            ))),
        },
    }
}

fn parse_port(port: &PortConfig) -> Result<PortMapping> {
    let invalid = |spec: &str| ConvoyError::InvalidConfig(format!("invalid port '{}'", spec));

    match port {
        PortConfig::Number(container_port) => Ok(PortMapping {
            host_port: 0,
            container_port: *container_port,
            protocol: Protocol::Tcp,
        }),
        PortConfig::Short(spec) => {
            let (ports, protocol) = match spec.split_once('/') {
                Some((ports, protocol)) => (ports, parse_protocol(protocol)?),
                None => (spec.as_str(), Protocol::Tcp),
            };
            let parts: Vec<&str> = ports.rsplitn(3, ':').collect();
            let (host, container) = match parts.as_slice() {
                [container] => ("0", *container),
                [container, host] => (*host, *container),
                [container, host, _ip] => (*host, *container),
                _ => return Err(invalid(spec.as_str())),
            };
            Ok(PortMapping {
                host_port: if host.is_empty() {
                    0
                } else {
                    host.parse().map_err(|_| invalid(spec.as_str()))?
                },
                container_port: container.parse().map_err(|_| invalid(spec.as_str()))?,
                protocol,
            })
        }
        PortConfig::Long(long) => {
            let host_port = match &long.published {
                None => 0,
                Some(PortNumber::Number(port)) => *port,
                Some(PortNumber::Text(text)) => text.parse().map_err(|_| invalid(text.as_str()))?,
            };
            Ok(PortMapping {
                host_port,
                container_port: long.target,
                protocol: long
                    .protocol
                    .as_deref()
                    .map(parse_protocol)
                    .transpose()?
                    .unwrap_or_default(),
            })
        }
    }
}

fn parse_protocol(protocol: &str) -> Result<Protocol> {
    match protocol {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        other => Err(ConvoyError::InvalidConfig(format!(
            "unsupported protocol '{}'",
            other
        ))),
    }
}

fn apply_healthcheck(definition: &mut ServiceDefinition, healthcheck: &HealthcheckConfig) -> Result<()> {
    if healthcheck.disable == Some(true) {
        return Ok(());
    }

    definition.health = match &healthcheck.test {
        None => HealthCheck::ProcessAlive,
        Some(HealthcheckTest::Command(command)) => shell(command),
        Some(HealthcheckTest::Array(test)) => match test.split_first() {
            Some((kind, rest)) if kind == "CMD" => HealthCheck::Command(rest.to_vec()),
            Some((kind, rest)) if kind == "CMD-SHELL" => shell(&rest.join(" ")),
            Some((kind, _)) if kind == "NONE" => HealthCheck::ProcessAlive,
            _ => {
                return Err(ConvoyError::InvalidConfig(format!(
                    "Service '{}': healthcheck test must start with CMD, CMD-SHELL or NONE",
                    definition.name
                )))
            }
        },
    };

    if let Some(interval) = &healthcheck.interval {
        definition.health_interval = Some(parse_duration(interval)?);
    }
    if let Some(retries) = healthcheck.retries {
        definition.health_retries = Some(retries);
    }
    // `start_period` is a grace window during which failed probes do not
    // count; after it, `retries` failures spaced `interval` apart mark the
    // container unhealthy. A starting service never counts failed probes,
    // so the whole window becomes its start timeout.
    if let Some(start_period) = &healthcheck.start_period {
        let interval = definition
            .health_interval
            .unwrap_or(COMPOSE_HEALTH_INTERVAL);
        let retries = definition.health_retries.unwrap_or(COMPOSE_HEALTH_RETRIES);
        definition.start_timeout = Some(parse_duration(start_period)? + interval * retries);
    }

    Ok(())
}

fn shell(command: &str) -> HealthCheck {
    HealthCheck::Command(vec![
        "sh".to_string(),
        "-c".to_string(),
        command.to_string(),
    ])
}

/// Split a shell-form command into arguments, honouring quotes
fn split_command(command: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote = None;
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_word = true;
                }
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ConvoyError::InvalidConfig(format!(
            "unterminated quote in command '{}'",
            command
        )));
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

/// Read `KEY=VALUE` lines; a missing file yields no variables
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(path)?;
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        vars.insert(key.trim().to_string(), value.to_string());
    }
    Ok(vars)
}
