//! Docker CLI runtime
//!
//! Drives containers, networks and volumes through the `docker` binary.
//! Containers carry the compose project and service labels, so `docker
//! compose ps` lists what this runtime started.

use super::{Liveness, Runtime};
use crate::container::ContainerSpec;
use crate::error::{ConvoyError, Result};
use crate::service::MountSource;
use crate::storage::VolumeDefinition;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// `docker inspect --format '{{json .State}}'` output
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerState {
    running: bool,
    #[serde(default)]
    exit_code: i32,
}

/// Runtime backed by the docker CLI
pub struct DockerRuntime {
    binary: PathBuf,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerRuntime {
    /// Use `docker` from `PATH`
    pub fn new() -> Self {
        Self::with_binary(PathBuf::from("docker"))
    }

    /// Use a specific docker-compatible binary
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    async fn output(&self, args: &[String]) -> Result<Output> {
        tracing::debug!("{} {}", self.binary.display(), args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ConvoyError::Runtime(format!(
                    "Failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })
    }

    /// Run a docker command and return its trimmed stdout
    async fn run(&self, args: &[String]) -> Result<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvoyError::Runtime(format!(
                "docker {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether a docker command succeeds, for `inspect`-style existence checks
    async fn succeeds(&self, args: &[String]) -> Result<bool> {
        Ok(self.output(args).await?.status.success())
    }
}

/// Arguments of `docker run` for a container spec
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];

    if let Some(network) = spec.networks.first() {
        args.extend([
            "--network".to_string(),
            network.clone(),
            "--network-alias".to_string(),
            spec.service.clone(),
        ]);
    }

    for (key, value) in &spec.env {
        args.extend(["-e".to_string(), format!("{}={}", key, value)]);
    }

    for port in &spec.ports {
        args.extend(["-p".to_string(), port.to_string()]);
    }

    for mount in &spec.volumes {
        let source = match &mount.source {
            MountSource::Bind(path) => path.display().to_string(),
            MountSource::Named(name) => name.clone(),
        };
        let mut volume = format!("{}:{}", source, mount.container_path);
        if mount.read_only {
            volume.push_str(":ro");
        }
        args.extend(["-v".to_string(), volume]);
    }

    for (key, value) in &spec.labels {
        args.extend(["--label".to_string(), format!("{}={}", key, value)]);
    }

    args.push(spec.image.clone());
    args.extend(spec.cmd.iter().cloned());
    args
}

/// Arguments of `docker volume create` for a volume definition
pub fn volume_args(volume: &VolumeDefinition) -> Vec<String> {
    let mut args = vec!["volume".to_string(), "create".to_string()];
    if let Some(path) = &volume.host_path {
        args.extend([
            "--driver".to_string(),
            "local".to_string(),
            "--opt".to_string(),
            "type=none".to_string(),
            "--opt".to_string(),
            "o=bind".to_string(),
            "--opt".to_string(),
            format!("device={}", path.display()),
        ]);
    }
    args.push(volume.name.clone());
    args
}

/// Arguments of `docker stop`; `-t` takes whole seconds, so partial seconds
/// round up rather than down to an immediate kill
pub fn stop_args(container: &str, grace: Duration) -> Vec<String> {
    let seconds = grace.as_secs_f64().ceil() as u64;
    strings(&["stop", "-t", &seconds.to_string(), container])
}

fn parse_state(json: &str) -> Result<Liveness> {
    let state: ContainerState = serde_json::from_str(json)?;
    Ok(if state.running {
        Liveness::Running
    } else {
        Liveness::Exited(state.exit_code)
    })
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl Runtime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<String> {
        // A stale container from an earlier run would block the name
        self.output(&strings(&["rm", "-f", &spec.name])).await?;

        let id = self.run(&run_args(spec)).await?;

        for network in spec.networks.iter().skip(1) {
            self.run(&strings(&[
                "network",
                "connect",
                "--alias",
                &spec.service,
                network,
                &spec.name,
            ]))
            .await?;
        }

        Ok(id.chars().take(12).collect())
    }

    async fn status(&self, container: &str) -> Result<Liveness> {
        let output = self
            .output(&strings(&[
                "inspect",
                "--type",
                "container",
                "--format",
                "{{json .State}}",
                container,
            ]))
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such") {
                return Ok(Liveness::Missing);
            }
            return Err(ConvoyError::Runtime(format!(
                "docker inspect failed: {}",
                stderr.trim()
            )));
        }

        parse_state(String::from_utf8_lossy(&output.stdout).trim())
    }

    async fn exec(&self, container: &str, command: &[String]) -> Result<i32> {
        let mut args = strings(&["exec", container]);
        args.extend(command.iter().cloned());

        let output = self.output(&args).await?;
        Ok(output.status.code().unwrap_or(-1))
    }

    async fn stop(&self, container: &str, grace: Duration) -> Result<()> {
        self.run(&stop_args(container, grace)).await?;
        Ok(())
    }

    async fn kill(&self, container: &str) -> Result<()> {
        self.run(&strings(&["kill", container])).await?;
        Ok(())
    }

    async fn remove(&self, container: &str) -> Result<()> {
        self.run(&strings(&["rm", container])).await?;
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        self.succeeds(&strings(&["network", "inspect", name])).await
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        self.run(&strings(&["network", "create", name])).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.run(&strings(&["network", "rm", name])).await?;
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        self.succeeds(&strings(&["volume", "inspect", name])).await
    }

    async fn create_volume(&self, volume: &VolumeDefinition) -> Result<()> {
        if let Some(path) = &volume.host_path {
            tokio::fs::create_dir_all(path).await?;
        }
        self.run(&volume_args(volume)).await?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.run(&strings(&["volume", "rm", name])).await?;
        Ok(())
    }
}
