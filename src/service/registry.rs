//! Service registry

use super::definition::ServiceDefinition;
use crate::error::{ConvoyError, Result};
use crate::network::NetworkDefinition;
use crate::storage::VolumeDefinition;
use indexmap::IndexMap;

/// Registry of service, network and volume definitions
///
/// Iteration always follows insertion order; the dependency graph relies on
/// it to break ties between unrelated services.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: IndexMap<String, ServiceDefinition>,
    networks: IndexMap<String, NetworkDefinition>,
    volumes: IndexMap<String, VolumeDefinition>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service
    pub fn register(&mut self, definition: ServiceDefinition) -> Result<()> {
        if self.services.contains_key(&definition.name) {
            return Err(ConvoyError::DuplicateName(definition.name));
        }

        tracing::debug!("Registered service {}", definition.name);
        self.services.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Get a service by name
    pub fn get(&self, name: &str) -> Result<&ServiceDefinition> {
        self.services
            .get(name)
            .ok_or_else(|| ConvoyError::NotFound(name.to_string()))
    }

    /// All services in insertion order
    pub fn all(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }

    /// Service names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Whether a service is registered
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Register a network
    pub fn register_network(&mut self, definition: NetworkDefinition) -> Result<()> {
        if self.networks.contains_key(&definition.name) {
            return Err(ConvoyError::DuplicateName(definition.name));
        }
        self.networks.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Register a volume
    pub fn register_volume(&mut self, definition: VolumeDefinition) -> Result<()> {
        if self.volumes.contains_key(&definition.name) {
            return Err(ConvoyError::DuplicateName(definition.name));
        }
        self.volumes.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Declared networks in insertion order
    pub fn networks(&self) -> impl Iterator<Item = &NetworkDefinition> {
        self.networks.values()
    }

    /// Declared volumes in insertion order
    pub fn volumes(&self) -> impl Iterator<Item = &VolumeDefinition> {
        self.volumes.values()
    }

    /// Get a declared network
    pub fn network(&self, name: &str) -> Option<&NetworkDefinition> {
        self.networks.get(name)
    }

    /// Get a declared volume
    pub fn volume(&self, name: &str) -> Option<&VolumeDefinition> {
        self.volumes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(ServiceDefinition::new("database", "mongo:4.0"))
            .unwrap();

        let def = registry.get("database").unwrap();
        assert_eq!(def.image, "mongo:4.0");
        assert!(registry.contains("database"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(ServiceDefinition::new("database", "mongo:4.0"))
            .unwrap();

        let err = registry
            .register(ServiceDefinition::new("database", "postgres"))
            .unwrap_err();
        assert!(matches!(err, ConvoyError::DuplicateName(name) if name == "database"));
        assert_eq!(registry.get("database").unwrap().image, "mongo:4.0");
    }

    #[test]
    fn test_get_unknown_service() {
        let registry = ServiceRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, ConvoyError::NotFound(name) if name == "missing"));
    }

    #[test]
    fn test_all_preserves_insertion_order() {
        let mut registry = ServiceRegistry::new();
        for name in ["webserver", "database", "workers", "messageq"] {
            registry
                .register(ServiceDefinition::new(name, "image"))
                .unwrap();
        }

        let names: Vec<&str> = registry.all().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["webserver", "database", "workers", "messageq"]);
    }

    #[test]
    fn test_duplicate_network_rejected() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_network(NetworkDefinition::new("annotator"))
            .unwrap();
        assert!(registry
            .register_network(NetworkDefinition::new("annotator").external(true))
            .is_err());
    }
}
