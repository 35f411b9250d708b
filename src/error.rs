//! Error types for Convoy

use crate::supervisor::DeploymentReport;
use std::time::Duration;
use thiserror::Error;

/// Result type for Convoy operations
pub type Result<T> = std::result::Result<T, ConvoyError>;

/// Convoy error types
#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Service {service} did not reach running within {timeout:?}")]
    StartupTimeout { service: String, timeout: Duration },

    #[error("Health check failed for {service}: {reason}")]
    HealthCheckFailure { service: String, reason: String },

    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    #[error("Deployment failed: {reason}\n{report}")]
    DeploymentFailed {
        reason: String,
        report: DeploymentReport,
        /// Error of the first service that gave up, if any
        #[source]
        cause: Option<Box<ConvoyError>>,
    },

    #[error("Deployment cancelled")]
    Cancelled,

    #[error("Compose file parse error: {0}")]
    ComposeParse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConvoyError {
    /// Whether the error was raised while validating configuration, before
    /// any service was started
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ConvoyError::DuplicateName(_)
                | ConvoyError::NotFound(_)
                | ConvoyError::CyclicDependency { .. }
                | ConvoyError::ResourceConflict(_)
                | ConvoyError::ComposeParse(_)
                | ConvoyError::InvalidConfig(_)
        )
    }

    /// The error of the service that failed a deployment, or `self`
    pub fn service_error(&self) -> &ConvoyError {
        match self {
            ConvoyError::DeploymentFailed {
                cause: Some(cause), ..
            } => &**cause,
            other => other,
        }
    }
}
