//! Convoy - a compose-compatible service supervisor
//!
//! Convoy brings up a set of interdependent containerised services in
//! dependency order and keeps them running:
//!
//! - Service registry built from compose files
//! - Dependency graph and deployment plans
//! - Lifecycle supervision with health checks and restart policies
//! - Shared network and volume provisioning
//!
//! Containers are driven through a [`runtime::Runtime`] backend, either the
//! docker CLI or an in-memory simulation.

pub mod compose;
pub mod container;
pub mod error;
pub mod network;
pub mod plan;
pub mod resource;
pub mod runtime;
pub mod service;
pub mod storage;
pub mod supervisor;

pub use error::{ConvoyError, Result};
