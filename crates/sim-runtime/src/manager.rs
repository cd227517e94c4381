//! Process-wide container registry.
//!
//! Keyed by both `container_id` and `container_name`; enforces name
//! uniqueness and refuses to delete anything but a `STOPPED` container.
//! One [`ContainerManager`] is shared by `bins/node-agentd` for the whole
//! process lifetime, handing out [`ContainerHandle`]s that each front one
//! single-writer container task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use sim_ecs::error::{ErrorKind, PlatformError};
use sim_ecs::module::ModuleCatalog;
use tokio::sync::RwLock;

use crate::container::{spawn_container, Container, ContainerConfig, ContainerHandle, ContainerStatus};
use sim_match::ContainerId;

struct Entry {
    handle: ContainerHandle,
    name: String,
}

/// Process-wide registry of running containers.
///
/// A single writer (this manager) guards container creation/deletion behind
/// an `RwLock`; reads (`get`, `list`) take the read half so concurrent
/// lookups never block on each other, following a single-writer,
/// many-reader shared-resource policy.
pub struct ContainerManager {
    catalog: Arc<dyn ModuleCatalog>,
    next_id: AtomicU64,
    entries: RwLock<FxHashMap<ContainerId, Entry>>,
    names: RwLock<FxHashMap<String, ContainerId>>,
}

impl ContainerManager {
    /// Create an empty manager backed by the given process-wide module catalog.
    #[must_use]
    pub fn new(catalog: Arc<dyn ModuleCatalog>) -> Self {
        Self {
            catalog,
            next_id: AtomicU64::new(1),
            entries: RwLock::new(FxHashMap::default()),
            names: RwLock::new(FxHashMap::default()),
        }
    }

    /// Create a container named `name`, installing `initial_modules` (if
    /// any) and auto-starting it when that list is non-empty.
    pub async fn create(
        &self,
        name: impl Into<String>,
        initial_modules: Vec<String>,
    ) -> Result<ContainerHandle, PlatformError> {
        self.create_with_config(name, initial_modules, ContainerConfig::default()).await
    }

    /// As [`Self::create`], with an explicit [`ContainerConfig`].
    pub async fn create_with_config(
        &self,
        name: impl Into<String>,
        initial_modules: Vec<String>,
        config: ContainerConfig,
    ) -> Result<ContainerHandle, PlatformError> {
        let name = name.into();
        let mut names = self.names.write().await;
        if names.contains_key(&name) {
            return Err(PlatformError::conflict(format!("container name '{name}' is already in use")));
        }

        let id = ContainerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut container = Container::new(id, name.clone(), config, Arc::clone(&self.catalog));
        for module_name in &initial_modules {
            container.install_module(module_name)?;
        }
        if !initial_modules.is_empty() {
            container.start()?;
        }

        let handle = spawn_container(container);
        let mut entries = self.entries.write().await;
        entries.insert(id, Entry { handle: handle.clone(), name: name.clone() });
        names.insert(name, id);
        Ok(handle)
    }

    /// Look up a container by id.
    pub async fn get(&self, id: ContainerId) -> Option<ContainerHandle> {
        self.entries.read().await.get(&id).map(|e| e.handle.clone())
    }

    /// Look up a container by its unique name.
    pub async fn get_by_name(&self, name: &str) -> Option<ContainerHandle> {
        let id = *self.names.read().await.get(name)?;
        self.get(id).await
    }

    /// List every tracked container's id.
    pub async fn list(&self) -> Vec<ContainerId> {
        self.entries.read().await.keys().copied().collect()
    }

    /// Delete a container. Refuses unless it reports `STOPPED`.
    pub async fn delete(&self, id: ContainerId) -> Result<(), PlatformError> {
        let handle = self
            .get(id)
            .await
            .ok_or_else(|| PlatformError::not_found(format!("container {id:?} does not exist")))?;

        let descriptor = handle
            .describe()
            .await
            .ok_or_else(|| PlatformError::new(ErrorKind::Internal, "container task is no longer running"))?;
        if descriptor.status != ContainerStatus::Stopped {
            return Err(PlatformError::invalid_state(format!(
                "container {id:?} cannot be deleted while {:?}; must be STOPPED",
                descriptor.status
            )));
        }
        handle.delete().await?;

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.remove(&id) {
            self.names.write().await.remove(&entry.name);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sim_ecs::module::InMemoryModuleCatalog;

    fn manager() -> ContainerManager {
        ContainerManager::new(Arc::new(InMemoryModuleCatalog::new()))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let mgr = manager();
        let handle = mgr.create("alpha", vec![]).await.unwrap();
        let desc = handle.describe().await.unwrap();
        let fetched = mgr.get(desc.id).await;
        assert!(fetched.is_some());
        let by_name = mgr.get_by_name("alpha").await;
        assert!(by_name.is_some());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let mgr = manager();
        mgr.create("dup", vec![]).await.unwrap();
        let err = mgr.create("dup", vec![]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn delete_requires_stopped() {
        let mgr = manager();
        let handle = mgr.create("needs-stop", vec![]).await.unwrap();
        let desc = handle.describe().await.unwrap();
        let err = mgr.delete(desc.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);

        handle.start().await.unwrap();
        handle.stop().await.unwrap();
        mgr.delete(desc.id).await.unwrap();
        assert!(mgr.get(desc.id).await.is_none());
        assert!(mgr.get_by_name("needs-stop").await.is_none());
    }

    #[tokio::test]
    async fn unknown_id_delete_is_not_found() {
        let mgr = manager();
        let err = mgr.delete(ContainerId(9999)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
