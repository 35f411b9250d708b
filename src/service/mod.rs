//! Service definitions and the service registry

pub mod definition;
pub mod registry;

pub use definition::{
    HealthCheck, MountSource, PortMapping, Protocol, RestartPolicy, ServiceDefinition,
    VolumeMount,
};
pub use registry::ServiceRegistry;
