//! Shared process state handed to every route handler via axum's
//! `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use auth_core::{AuthConfig, AuthService};
use control_plane::{Autoscaler, ControlPlaneConfig, MatchDeployer, ModuleDistributor, NodeProxy, NodeRegistry, NodeTransport, ProxyConfig};
use tokio::sync::RwLock;

use crate::transport::ReqwestTransport;

/// Everything a route handler needs: the node registry, module distributor,
/// match deployer, autoscaler, proxy, and auth service, wired once at
/// startup from the environment.
#[derive(Clone)]
pub struct AppState {
    /// Node records keyed by node id, with TTL-derived health.
    pub nodes: Arc<NodeRegistry>,
    /// Module artifact catalog and per-node distribution.
    pub modules: Arc<ModuleDistributor>,
    /// Match placement onto nodes.
    pub deployer: Arc<MatchDeployer>,
    /// Scale-up/scale-down recommendations from cluster load.
    pub autoscaler: Arc<Autoscaler>,
    /// Client-request forwarding to the node hosting a resource.
    pub proxy: Arc<NodeProxy>,
    /// Login, token issuance, and scope checks.
    pub auth: Arc<RwLock<AuthService>>,
}

impl AppState {
    /// Build process state from configuration loaded from the environment.
    #[must_use]
    pub fn new() -> Self {
        let config = ControlPlaneConfig::from_env();
        let proxy_config = ProxyConfig::from_env();
        let api_token = std::env::var("node_api_token").ok();
        let transport: Arc<dyn NodeTransport> = Arc::new(ReqwestTransport::new(api_token));

        let nodes = Arc::new(NodeRegistry::new(Duration::from_secs(config.node_ttl_seconds)));
        let modules = Arc::new(ModuleDistributor::new(transport.clone()));
        let deployer = Arc::new(MatchDeployer::new(transport.clone()));
        let autoscaler = Arc::new(Autoscaler::new(config));
        let proxy = Arc::new(NodeProxy::new(proxy_config, transport));
        let auth = Arc::new(RwLock::new(AuthService::new(AuthConfig::from_env())));

        Self { nodes, modules, deployer, autoscaler, proxy, auth }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
