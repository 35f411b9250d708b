//! Shared resource tracking for networks and volumes
//!
//! Both networks and volumes follow the same rules: external resources are
//! assumed to exist and are never created or removed, managed resources are
//! created on first `ensure` and removed on `release` once no service
//! references them.

use crate::error::{ConvoyError, Result};
use crate::runtime::Runtime;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A resource provisioned through the runtime
#[async_trait]
pub trait ManagedResource: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Resource kind, for logs and errors
    const KIND: &'static str;

    fn name(&self) -> &str;

    /// Whether the resource is managed outside this deployment
    fn is_external(&self) -> bool;

    async fn exists(&self, runtime: &dyn Runtime) -> Result<bool>;

    async fn create(&self, runtime: &dyn Runtime) -> Result<()>;

    async fn remove(&self, runtime: &dyn Runtime) -> Result<()>;
}

/// Tracked resource state
#[derive(Debug, Clone)]
pub struct TrackedResource<D> {
    /// Definition the resource was ensured with
    pub definition: D,
    /// Number of services currently using it
    pub references: usize,
    /// When it was first ensured
    pub ensured_at: DateTime<Utc>,
}

/// Manager for one kind of resource
pub struct ResourceManager<D: ManagedResource> {
    runtime: Arc<dyn Runtime>,
    entries: Mutex<IndexMap<String, TrackedResource<D>>>,
}

impl<D: ManagedResource> ResourceManager<D> {
    /// Create a new manager backed by `runtime`
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self {
            runtime,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Make sure the resource exists. Returns whether it was created by this
    /// call. Calling it again with the same definition has no effect.
    pub async fn ensure(&self, definition: &D) -> Result<bool> {
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries.get(definition.name()) {
            if existing.definition != *definition {
                return Err(ConvoyError::ResourceConflict(format!(
                    "{} {} is already defined differently",
                    D::KIND,
                    definition.name()
                )));
            }
            return Ok(false);
        }

        let created = if definition.is_external() {
            if !definition.exists(self.runtime.as_ref()).await? {
                tracing::warn!(
                    "External {} {} does not exist; services using it may fail to start",
                    D::KIND,
                    definition.name()
                );
            }
            false
        } else if definition.exists(self.runtime.as_ref()).await? {
            tracing::debug!("Reusing existing {} {}", D::KIND, definition.name());
            false
        } else {
            definition.create(self.runtime.as_ref()).await?;
            tracing::info!("Created {} {}", D::KIND, definition.name());
            true
        };

        entries.insert(
            definition.name().to_string(),
            TrackedResource {
                definition: definition.clone(),
                references: 0,
                ensured_at: Utc::now(),
            },
        );

        Ok(created)
    }

    /// Track a resource left behind by an earlier run without creating it.
    /// Returns whether it exists.
    pub async fn adopt(&self, definition: &D) -> Result<bool> {
        let exists = definition.exists(self.runtime.as_ref()).await?;
        if exists {
            self.entries
                .lock()
                .await
                .entry(definition.name().to_string())
                .or_insert_with(|| TrackedResource {
                    definition: definition.clone(),
                    references: 0,
                    ensured_at: Utc::now(),
                });
        }
        Ok(exists)
    }

    /// Remove the resource if it is managed and unreferenced. Returns whether
    /// it was removed.
    pub async fn release(&self, name: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get(name) else {
            return Ok(false);
        };

        if entry.references > 0 {
            tracing::debug!(
                "{} {} still referenced by {} service(s)",
                D::KIND,
                name,
                entry.references
            );
            return Ok(false);
        }

        if entry.definition.is_external() {
            entries.shift_remove(name);
            return Ok(false);
        }

        let definition = entry.definition.clone();
        if definition.exists(self.runtime.as_ref()).await? {
            definition.remove(self.runtime.as_ref()).await?;
            tracing::info!("Removed {} {}", D::KIND, name);
        }
        entries.shift_remove(name);

        Ok(true)
    }

    /// Record that a service uses the resource
    pub async fn add_reference(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| ConvoyError::NotFound(format!("{} {}", D::KIND, name)))?;
        entry.references += 1;
        Ok(())
    }

    /// Record that a service stopped using the resource
    pub async fn remove_reference(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| ConvoyError::NotFound(format!("{} {}", D::KIND, name)))?;
        entry.references = entry.references.saturating_sub(1);
        Ok(())
    }

    /// Tracked state of a resource
    pub async fn get(&self, name: &str) -> Option<TrackedResource<D>> {
        self.entries.lock().await.get(name).cloned()
    }

    /// Names of tracked resources in the order they were ensured
    pub async fn names(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }
}
