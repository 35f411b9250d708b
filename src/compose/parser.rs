//! Compose file parser

use super::config::{
    CommandConfig, ComposeConfig, DependsOnConfig, EnvironmentConfig, HealthcheckTest, PortConfig,
    ServiceConfig, VolumeMountConfig,
};
use crate::error::{ConvoyError, Result};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Default compose file names
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// `$$`, `$VAR`, `${VAR}` and `${VAR<op><arg>}` with op one of `:-`, `-`, `:?`, `?`
static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\$|\{([A-Za-z_][A-Za-z0-9_]*)(?:(:?[-?])([^}]*))?\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("Invalid interpolation pattern")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)?(?:h|ms|m|s|us|ns))+$").expect("Invalid duration pattern")
});

static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(h|ms|m|s|us|ns)").expect("Invalid duration pattern")
});

/// Compose file parser
pub struct ComposeParser;

impl ComposeParser {
    /// Find compose file in directory
    pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
        for name in DEFAULT_COMPOSE_FILES {
            let path = dir.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Parse compose file from path
    pub fn parse_file(path: &Path) -> Result<ComposeConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvoyError::ComposeParse(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_str(&content)
    }

    /// Parse compose file from string
    pub fn parse_str(content: &str) -> Result<ComposeConfig> {
        serde_yaml::from_str(content)
            .map_err(|e| ConvoyError::ComposeParse(format!("Failed to parse YAML: {}", e)))
    }

    /// Parse multiple compose files, later files overriding earlier ones
    pub fn parse_files(paths: &[PathBuf]) -> Result<ComposeConfig> {
        let mut config = ComposeConfig::default();

        for path in paths {
            tracing::debug!("Reading compose file {}", path.display());
            let file_config = Self::parse_file(path)?;
            config = Self::merge_configs(config, file_config);
        }

        Ok(config)
    }

    /// Merge two compose configurations
    pub fn merge_configs(base: ComposeConfig, overlay: ComposeConfig) -> ComposeConfig {
        let mut result = base;

        if overlay.version.is_some() {
            result.version = overlay.version;
        }
        if overlay.name.is_some() {
            result.name = overlay.name;
        }

        for (name, service) in overlay.services {
            match result.services.get_mut(&name) {
                Some(existing) => merge_service(existing, service),
                None => {
                    result.services.insert(name, service);
                }
            }
        }

        for (name, network) in overlay.networks {
            result.networks.insert(name, network);
        }
        for (name, volume) in overlay.volumes {
            result.volumes.insert(name, volume);
        }

        result
    }

    /// Validate compose configuration, returning warnings
    pub fn validate(config: &ComposeConfig) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if config.services.is_empty() {
            return Err(ConvoyError::ComposeParse(
                "No services defined".to_string(),
            ));
        }

        for (name, service) in &config.services {
            if service.image.is_none() {
                let reason = if service.build.is_some() {
                    "building images is not supported; set 'image'"
                } else {
                    "'image' is required"
                };
                return Err(ConvoyError::ComposeParse(format!(
                    "Service '{}': {}",
                    name, reason
                )));
            }

            if let Some(DependsOnConfig::Map(map)) = &service.depends_on {
                for (dependency, condition) in map {
                    match condition.condition.as_deref() {
                        None | Some("service_started") | Some("service_healthy") => {}
                        Some(other) => warnings.push(format!(
                            "Service '{}' waits for '{}' with unsupported condition '{}' (treated as running)",
                            name, dependency, other
                        )),
                    }
                }
            }

            for network in service.network_names() {
                if network != "default" && !config.networks.contains_key(&network) {
                    warnings.push(format!(
                        "Service '{}' references undefined network '{}' (will be created)",
                        name, network
                    ));
                }
            }

            for volume in service.volumes.iter().flatten() {
                if let Some(source) = named_volume_source(volume) {
                    if !config.volumes.contains_key(source) {
                        warnings.push(format!(
                            "Service '{}' references undefined volume '{}' (will be created)",
                            name, source
                        ));
                    }
                }
            }
        }

        Ok(warnings)
    }

    /// Interpolate environment variables in the string fields of every
    /// service
    pub fn interpolate(config: &mut ComposeConfig, env: &HashMap<String, String>) -> Result<()> {
        for service in config.services.values_mut() {
            interpolate_service(service, env)?;
        }
        Ok(())
    }
}

fn merge_service(existing: &mut ServiceConfig, overlay: ServiceConfig) {
    if overlay.image.is_some() {
        existing.image = overlay.image;
    }
    if overlay.build.is_some() {
        existing.build = overlay.build;
    }
    if overlay.command.is_some() {
        existing.command = overlay.command;
    }
    if overlay.container_name.is_some() {
        existing.container_name = overlay.container_name;
    }
    if let Some(environment) = overlay.environment {
        existing.environment = Some(match existing.environment.take() {
            Some(base) => merge_environment(base, environment),
            None => environment,
        });
    }
    if overlay.ports.is_some() {
        existing.ports = overlay.ports;
    }
    if overlay.volumes.is_some() {
        existing.volumes = overlay.volumes;
    }
    if overlay.networks.is_some() {
        existing.networks = overlay.networks;
    }
    if overlay.depends_on.is_some() {
        existing.depends_on = overlay.depends_on;
    }
    if overlay.restart.is_some() {
        existing.restart = overlay.restart;
    }
    if overlay.healthcheck.is_some() {
        existing.healthcheck = overlay.healthcheck;
    }
    if overlay.stop_grace_period.is_some() {
        existing.stop_grace_period = overlay.stop_grace_period;
    }
    if overlay.deploy.is_some() {
        existing.deploy = overlay.deploy;
    }
}

/// Merge environments key by key, overlay values winning
fn merge_environment(base: EnvironmentConfig, overlay: EnvironmentConfig) -> EnvironmentConfig {
    let mut merged = environment_map(base);
    for (key, value) in environment_map(overlay) {
        merged.insert(key, value);
    }
    EnvironmentConfig::Map(merged)
}

fn environment_map(env: EnvironmentConfig) -> IndexMap<String, Option<serde_yaml::Value>> {
    match env {
        EnvironmentConfig::Map(map) => map,
        EnvironmentConfig::Array(items) => items
            .into_iter()
            .map(|item| match item.split_once('=') {
                Some((key, value)) => (
                    key.to_string(),
                    Some(serde_yaml::Value::String(value.to_string())),
                ),
                None => (item.clone(), None),
            })
            .collect(),
    }
}

fn named_volume_source(volume: &VolumeMountConfig) -> Option<&str> {
    match volume {
        VolumeMountConfig::Short(spec) => {
            let (source, _) = spec.split_once(':')?;
            is_volume_name(source).then_some(source)
        }
        VolumeMountConfig::Long(long) => match long.mount_type.as_deref() {
            Some("volume") | None => long.source.as_deref().filter(|s| is_volume_name(s)),
            Some(_) => None,
        },
    }
}

/// Whether a mount source names a volume rather than a host path
pub(crate) fn is_volume_name(source: &str) -> bool {
    !source.is_empty()
        && !source.starts_with('.')
        && !source.starts_with('/')
        && !source.starts_with('~')
}

fn interpolate_service(service: &mut ServiceConfig, env: &HashMap<String, String>) -> Result<()> {
    if let Some(image) = &mut service.image {
        *image = interpolate_str(image, env)?;
    }
    if let Some(name) = &mut service.container_name {
        *name = interpolate_str(name, env)?;
    }

    match &mut service.command {
        Some(CommandConfig::Shell(command)) => *command = interpolate_str(command, env)?,
        Some(CommandConfig::Exec(args)) => {
            for arg in args.iter_mut() {
                *arg = interpolate_str(arg, env)?;
            }
        }
        None => {}
    }

    match &mut service.environment {
        Some(EnvironmentConfig::Array(items)) => {
            for item in items.iter_mut() {
                *item = interpolate_str(item, env)?;
            }
        }
        Some(EnvironmentConfig::Map(map)) => {
            for value in map.values_mut() {
                if let Some(serde_yaml::Value::String(v)) = value {
                    *v = interpolate_str(v, env)?;
                }
            }
        }
        None => {}
    }

    for port in service.ports.iter_mut().flatten() {
        if let PortConfig::Short(spec) = port {
            *spec = interpolate_str(spec, env)?;
        }
    }

    for volume in service.volumes.iter_mut().flatten() {
        match volume {
            VolumeMountConfig::Short(spec) => *spec = interpolate_str(spec, env)?,
            VolumeMountConfig::Long(long) => {
                if let Some(source) = &mut long.source {
                    *source = interpolate_str(source, env)?;
                }
            }
        }
    }

    if let Some(healthcheck) = &mut service.healthcheck {
        match &mut healthcheck.test {
            Some(HealthcheckTest::Command(command)) => {
                *command = interpolate_str(command, env)?
            }
            Some(HealthcheckTest::Array(args)) => {
                for arg in args.iter_mut() {
                    *arg = interpolate_str(arg, env)?;
                }
            }
            None => {}
        }
    }

    Ok(())
}

/// Interpolate environment variables in a string
///
/// Unset variables without a default become empty with a warning; `$$` is a
/// literal `$`.
pub fn interpolate_str(s: &str, env: &HashMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(s.len());
    let mut last = 0;

    for caps in VARIABLE.captures_iter(s) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        result.push_str(&s[last..whole.start()]);
        result.push_str(&substitute(&caps, env)?);
        last = whole.end();
    }
    result.push_str(&s[last..]);

    Ok(result)
}

fn substitute(caps: &Captures<'_>, env: &HashMap<String, String>) -> Result<String> {
    let Some(name) = caps.get(1).or_else(|| caps.get(4)).map(|m| m.as_str()) else {
        // `$$`
        return Ok("$".to_string());
    };

    let value = env.get(name);
    let operator = caps.get(2).map(|m| m.as_str());
    let argument = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

    let unset_or_empty = value.is_none_or(|v| v.is_empty());
    match operator {
        Some(":-") if unset_or_empty => Ok(argument.to_string()),
        Some("-") if value.is_none() => Ok(argument.to_string()),
        Some(":?") if unset_or_empty => Err(required(name, argument)),
        Some("?") if value.is_none() => Err(required(name, argument)),
        _ => match value {
            Some(value) => Ok(value.clone()),
            None => {
                tracing::warn!("The {} variable is not set. Defaulting to a blank string.", name);
                Ok(String::new())
            }
        },
    }
}

fn required(name: &str, message: &str) -> ConvoyError {
    if message.is_empty() {
        ConvoyError::InvalidConfig(format!("required variable {} is missing a value", name))
    } else {
        ConvoyError::InvalidConfig(format!("required variable {}: {}", name, message))
    }
}

/// Parse a compose duration such as `1h30m`, `90s`, `500ms` or a bare
/// number of seconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if let Ok(seconds) = s.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    if !DURATION.is_match(s) {
        return Err(ConvoyError::InvalidConfig(format!(
            "invalid duration '{}'",
            s
        )));
    }

    let mut total = Duration::ZERO;
    for caps in DURATION_PART.captures_iter(s) {
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| ConvoyError::InvalidConfig(format!("invalid duration '{}'", s)))?;
        let unit = match &caps[2] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" => 1e-6,
            _ => 1e-9,
        };
        total += Duration::from_secs_f64(value * unit);
    }

    Ok(total)
}
