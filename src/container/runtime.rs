//! Simulated container instance

use super::config::{ContainerSpec, ContainerStatus};
use crate::error::{ConvoyError, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Container instance tracked by the simulated runtime
#[derive(Debug, Clone)]
pub struct Container {
    /// Unique container ID
    pub id: String,
    /// Launch spec
    pub spec: ContainerSpec,
    /// Current status
    pub status: ContainerStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Start time
    pub started_at: Option<DateTime<Utc>>,
    /// Stop time
    pub finished_at: Option<DateTime<Utc>>,
    /// Exit code
    pub exit_code: Option<i32>,
}

impl Container {
    /// Create a new container
    pub fn new(spec: ContainerSpec) -> Self {
        Self {
            id: Uuid::new_v4().to_string().replace('-', "")[..12].to_string(),
            spec,
            status: ContainerStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            exit_code: None,
        }
    }

    /// Get container name
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Check if container is running
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }

    /// Start the container
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ConvoyError::Runtime(format!(
                "container {} is already running",
                self.name()
            )));
        }

        self.status = ContainerStatus::Running;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.exit_code = None;
        Ok(())
    }

    /// Record process exit
    pub fn exit(&mut self, code: i32) {
        self.status = ContainerStatus::Exited;
        self.finished_at = Some(Utc::now());
        self.exit_code = Some(code);
    }

    /// Stop the container gracefully
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(ConvoyError::Runtime(format!(
                "container {} is not running",
                self.name()
            )));
        }

        self.exit(0);
        Ok(())
    }

    /// Kill the container
    pub fn kill(&mut self) {
        if self.is_running() {
            self.exit(137);
        }
    }
}
