//! Dependency graph builder

use super::DeploymentPlan;
use crate::error::{ConvoyError, Result};
use crate::network::NetworkDefinition;
use crate::service::{ServiceDefinition, ServiceRegistry};
use crate::storage::VolumeDefinition;
use indexmap::{IndexMap, IndexSet};

/// Builds deployment plans from a registry
pub struct DependencyGraph<'a> {
    registry: &'a ServiceRegistry,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(registry: &'a ServiceRegistry) -> Self {
        Self { registry }
    }

    /// Build a plan for every registered service
    pub fn build(registry: &ServiceRegistry) -> Result<DeploymentPlan> {
        DependencyGraph::new(registry).plan()
    }

    /// Produce the deployment plan: services in an order where every
    /// dependency precedes its dependents, unrelated services keeping their
    /// registration order, plus the networks and volumes they need.
    pub fn plan(&self) -> Result<DeploymentPlan> {
        self.check_dependencies()?;

        let order = self.start_order()?;
        let services: Vec<ServiceDefinition> = order
            .iter()
            .map(|name| self.registry.get(name).cloned())
            .collect::<Result<_>>()?;

        let networks = self.collect_networks(&services);
        let volumes = self.collect_volumes(&services);

        Ok(DeploymentPlan::new(services, networks, volumes))
    }

    /// Every dependency must name a registered service
    fn check_dependencies(&self) -> Result<()> {
        for service in self.registry.all() {
            for dep in &service.depends_on {
                if !self.registry.contains(dep) {
                    tracing::error!(
                        "Service '{}' depends on unknown service '{}'",
                        service.name,
                        dep
                    );
                    return Err(ConvoyError::NotFound(dep.clone()));
                }
            }
        }
        Ok(())
    }

    /// Depth-first topological sort in registration order
    pub fn start_order(&self) -> Result<Vec<String>> {
        let mut order = Vec::with_capacity(self.registry.len());
        let mut visited = IndexSet::new();
        let mut visiting = IndexSet::new();

        for name in self.registry.names() {
            self.visit(name, &mut visited, &mut visiting, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        service: &str,
        visited: &mut IndexSet<String>,
        visiting: &mut IndexSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if visited.contains(service) {
            return Ok(());
        }

        if let Some(start) = visiting.get_index_of(service) {
            let mut cycle: Vec<String> = visiting.iter().skip(start).cloned().collect();
            cycle.push(service.to_string());
            return Err(ConvoyError::CyclicDependency { cycle });
        }

        visiting.insert(service.to_string());

        let definition = self.registry.get(service)?;
        for dep in &definition.depends_on {
            self.visit(dep, visited, visiting, order)?;
        }

        visiting.shift_remove(service);
        visited.insert(service.to_string());
        order.push(service.to_string());

        Ok(())
    }

    /// Declared networks in use, plus any a service joins without declaring
    fn collect_networks(&self, services: &[ServiceDefinition]) -> Vec<NetworkDefinition> {
        let mut networks: IndexMap<String, NetworkDefinition> = self
            .registry
            .networks()
            .map(|n| (n.name.clone(), n.clone()))
            .collect();

        for service in services {
            for name in &service.networks {
                if !networks.contains_key(name) {
                    tracing::warn!(
                        "Service '{}' references undefined network '{}' (will be created)",
                        service.name,
                        name
                    );
                    networks.insert(name.clone(), NetworkDefinition::new(name));
                }
            }
        }

        networks.into_values().collect()
    }

    /// Declared volumes, plus any named volume a service mounts without
    /// declaring
    fn collect_volumes(&self, services: &[ServiceDefinition]) -> Vec<VolumeDefinition> {
        let mut volumes: IndexMap<String, VolumeDefinition> = self
            .registry
            .volumes()
            .map(|v| (v.name.clone(), v.clone()))
            .collect();

        for service in services {
            for name in service.named_volumes() {
                if !volumes.contains_key(name) {
                    tracing::warn!(
                        "Service '{}' references undefined volume '{}' (will be created)",
                        service.name,
                        name
                    );
                    volumes.insert(name.to_string(), VolumeDefinition::new(name));
                }
            }
        }

        volumes.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(services: &[(&str, &[&str])]) -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        for (name, deps) in services {
            let mut def = ServiceDefinition::new(name, "image");
            for dep in *deps {
                def = def.depends_on(dep);
            }
            registry.register(def).unwrap();
        }
        registry
    }

    fn assert_dependencies_first(registry: &ServiceRegistry, plan: &DeploymentPlan) {
        for service in registry.all() {
            let pos = plan.position(&service.name).unwrap();
            for dep in &service.depends_on {
                assert!(
                    plan.position(dep).unwrap() < pos,
                    "{} must precede {}",
                    dep,
                    service.name
                );
            }
        }
    }

    #[test]
    fn test_annotator_start_order() {
        let registry = registry(&[
            ("database", &[]),
            ("messageq", &[]),
            ("workers", &["messageq", "database"]),
            ("webserver", &["database", "workers"]),
        ]);

        let plan = DependencyGraph::build(&registry).unwrap();
        assert_eq!(
            plan.names(),
            vec!["database", "messageq", "workers", "webserver"]
        );
        assert_dependencies_first(&registry, &plan);
    }

    #[test]
    fn test_dependents_declared_first() {
        let registry = registry(&[
            ("webserver", &["database", "workers"]),
            ("workers", &["messageq", "database"]),
            ("messageq", &[]),
            ("database", &[]),
        ]);

        let plan = DependencyGraph::build(&registry).unwrap();
        assert_dependencies_first(&registry, &plan);
        assert_eq!(plan.names().last(), Some(&"webserver"));
    }

    #[test]
    fn test_independent_services_keep_registration_order() {
        let registry = registry(&[("b", &[]), ("a", &[]), ("c", &["a", "b"])]);

        let plan = DependencyGraph::build(&registry).unwrap();
        assert_eq!(plan.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_chain_of_dependencies() {
        let registry = registry(&[("web", &["api"]), ("api", &["db"]), ("db", &[])]);

        let plan = DependencyGraph::build(&registry).unwrap();
        assert_eq!(plan.names(), vec!["db", "api", "web"]);
    }

    #[test]
    fn test_cycle_detected_and_named() {
        let registry = registry(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);

        let err = DependencyGraph::build(&registry).unwrap_err();
        match err {
            ConvoyError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "c", "a"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let registry = registry(&[("a", &["a"])]);
        assert!(matches!(
            DependencyGraph::build(&registry),
            Err(ConvoyError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        let registry = registry(&[("db", &[]), ("a", &["db", "b"]), ("b", &["a"])]);

        let err = DependencyGraph::build(&registry).unwrap_err();
        assert!(
            matches!(err, ConvoyError::CyclicDependency { ref cycle } if cycle == &["a", "b", "a"])
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let registry = registry(&[("workers", &["messageq"])]);

        let err = DependencyGraph::build(&registry).unwrap_err();
        assert!(matches!(err, ConvoyError::NotFound(name) if name == "messageq"));
    }

    #[test]
    fn test_implicit_resources_are_added() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_network(NetworkDefinition::new("shared").external(true))
            .unwrap();
        registry
            .register(
                ServiceDefinition::new("database", "mongo:4.0")
                    .network("shared")
                    .network("backend")
                    .volume("mongodb_data", "/data/db"),
            )
            .unwrap();

        let plan = DependencyGraph::build(&registry).unwrap();
        let networks: Vec<_> = plan.networks().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(networks, vec!["shared", "backend"]);
        assert!(plan.networks()[0].external);
        assert!(!plan.networks()[1].external);
        assert_eq!(plan.volumes()[0].name, "mongodb_data");
    }
}
