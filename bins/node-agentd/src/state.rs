//! Shared process state handed to every route handler via axum's
//! `State` extractor.

use std::sync::Arc;

use auth_core::AuthConfig;
use auth_core::AuthService;
use sim_runtime::{
    ContainerManager, HistoryStore, InMemoryHistoryStore, NullHistoryStore, PersistenceConfig,
};
use tokio::sync::RwLock;

use crate::ws::RateLimitConfig;

/// Everything a route handler needs: the container registry, the auth
/// service, and the durable history backend, wired once at startup
/// according to [`PersistenceConfig`].
#[derive(Clone)]
pub struct AppState {
    /// Process-wide container registry.
    pub containers: Arc<ContainerManager>,
    /// Login, token issuance, and scope checks.
    pub auth: Arc<RwLock<AuthService>>,
    /// Beyond-the-retention-window snapshot storage.
    pub history: Arc<dyn HistoryStore>,
    /// This node's self-reported identity, used when registering with a
    /// control plane and in health/status responses.
    pub node_id: String,
    /// Per-connection command-socket throttle.
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    /// Build process state from a module catalog and configuration loaded
    /// from the environment.
    #[must_use]
    pub fn new(containers: Arc<ContainerManager>, node_id: String) -> Self {
        let auth = AuthService::new(AuthConfig::from_env());
        let persistence = PersistenceConfig::from_env();
        let history: Arc<dyn HistoryStore> = if persistence.enabled {
            Arc::new(InMemoryHistoryStore::default())
        } else {
            Arc::new(NullHistoryStore)
        };
        Self {
            containers,
            auth: Arc::new(RwLock::new(auth)),
            history,
            node_id,
            rate_limit: RateLimitConfig::from_env(),
        }
    }
}
