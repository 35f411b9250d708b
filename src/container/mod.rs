//! Container specs and the simulated runtime
//!
//! A [`ContainerSpec`] is what a runtime needs to launch one service. The
//! [`ContainerManager`] keeps containers in memory and implements
//! [`Runtime`](crate::runtime::Runtime) without touching a real engine.

pub mod config;
pub mod lifecycle;
pub mod runtime;

pub use config::{container_name, ContainerSpec, ContainerStatus};
pub use lifecycle::{ContainerManager, RuntimeEvent};
pub use runtime::Container;
