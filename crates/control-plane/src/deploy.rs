//! Match placement onto nodes.

use std::sync::Arc;
use std::time::SystemTime;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sim_ecs::error::{ErrorKind, PlatformError};
use tokio::sync::RwLock;

use crate::node::{Node, NodeId, NodeRegistry};
use crate::transport::{CreateMatchRequest, NodeTransport};

/// A request to place a new match somewhere in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSpec {
    /// A human-readable container name, unique on the chosen node.
    pub container_name: String,
    /// Modules the match must have enabled; every name must resolve on the
    /// node's module catalog (validated by the node itself; the deployer
    /// only validates non-emptiness here).
    pub module_names: Vec<String>,
}

/// A deployment's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// Node has been asked to create the match; awaiting acknowledgment.
    Pending,
    /// The node acknowledged and the match is live.
    Active,
    /// The node rejected the request, or the call timed out.
    Failed,
    /// `undeploy` has been acknowledged by the node.
    Undeployed,
}

/// A record binding a match to the node hosting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// The deployed match's id, as assigned by the hosting node.
    pub match_id: u64,
    /// The container id on the hosting node.
    pub container_id: Option<u64>,
    /// The node hosting this match.
    pub node_id: String,
    /// Modules enabled for this match.
    pub module_names: Vec<String>,
    /// When the deployment was first created.
    pub created_at: SystemTime,
    /// Current lifecycle status.
    pub status: DeploymentStatus,
}

/// Deploys matches onto nodes and tracks their lifecycle.
///
/// A synthetic, deployer-assigned `u64` key (distinct from the node's own
/// match id) indexes the `Deployment` table so `deploy` can hand the caller
/// a tracking id before the node has acknowledged anything.
pub struct MatchDeployer {
    deployments: RwLock<FxHashMap<u64, Deployment>>,
    next_id: RwLock<u64>,
    transport: Arc<dyn NodeTransport>,
}

impl MatchDeployer {
    /// Build a deployer that dispatches through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn NodeTransport>) -> Self {
        Self { deployments: RwLock::default(), next_id: RwLock::new(1), transport }
    }

    /// Select the best `HEALTHY` node for a new deployment: lowest
    /// `containers/max_containers`, ties by lowest `match_count`, then by
    /// lowest `cpu_load`.
    fn select_node(candidates: &[Node]) -> Option<&Node> {
        candidates.iter().min_by(|a, b| {
            a.load_fraction()
                .partial_cmp(&b.load_fraction())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.metrics.match_count.cmp(&b.metrics.match_count))
                .then(a.metrics.cpu_load.partial_cmp(&b.metrics.cpu_load).unwrap_or(std::cmp::Ordering::Equal))
        })
    }

    /// Place `spec` on the best available node, recording a `Deployment`.
    /// Flips to `ACTIVE` on node acknowledgment, `FAILED` on error (the slot
    /// is implicitly freed since nothing else reads a `FAILED` deployment as
    /// occupying node capacity).
    pub async fn deploy(&self, spec: MatchSpec, nodes: &NodeRegistry) -> Result<Deployment, PlatformError> {
        if spec.module_names.is_empty() {
            return Err(PlatformError::validation("match spec must enable at least one module"));
        }

        let candidates = nodes.list_healthy(SystemTime::now()).await;
        let chosen = Self::select_node(&candidates)
            .ok_or_else(|| PlatformError::new(ErrorKind::UpstreamUnavailable, "no healthy node available to host the match"))?
            .clone();

        let id = {
            let mut next = self.next_id.write().await;
            let id = *next;
            *next += 1;
            id
        };

        let mut deployment = Deployment {
            match_id: id,
            container_id: None,
            node_id: chosen.id.0.clone(),
            module_names: spec.module_names.clone(),
            created_at: SystemTime::now(),
            status: DeploymentStatus::Pending,
        };
        self.deployments.write().await.insert(id, deployment.clone());

        let ack = self
            .transport
            .create_match(
                &chosen.id,
                CreateMatchRequest { container_name: spec.container_name, module_names: spec.module_names },
            )
            .await;

        match ack {
            Ok(ack) => {
                deployment.status = DeploymentStatus::Active;
                deployment.container_id = Some(ack.container_id);
                deployment.match_id = ack.match_id;
                // The node assigns the real match id on acknowledgment; the
                // deployment table is keyed by that id from here on, not by
                // the deployer's own tracking id used while PENDING.
                let mut deployments = self.deployments.write().await;
                deployments.remove(&id);
                deployments.insert(ack.match_id, deployment.clone());
            }
            Err(_cause) => {
                deployment.status = DeploymentStatus::Failed;
                self.deployments.write().await.insert(id, deployment.clone());
            }
        }
        Ok(deployment)
    }

    /// Instruct the hosting node to tear down a match. `NOT_FOUND` if no
    /// such deployment is tracked.
    pub async fn undeploy(&self, match_id: u64) -> Result<Deployment, PlatformError> {
        let mut deployments = self.deployments.write().await;
        let deployment = deployments
            .get_mut(&match_id)
            .ok_or_else(|| PlatformError::not_found(format!("deployment for match {match_id} does not exist")))?;

        let Some(container_id) = deployment.container_id else {
            return Err(PlatformError::invalid_state(format!(
                "deployment for match {match_id} never became active"
            )));
        };
        self.transport
            .undeploy_match(&NodeId(deployment.node_id.clone()), container_id, deployment.match_id)
            .await
            .map_err(|cause| PlatformError::new(ErrorKind::UpstreamUnavailable, cause))?;
        deployment.status = DeploymentStatus::Undeployed;
        Ok(deployment.clone())
    }

    /// Fetch the last known status of a deployment. `NOT_FOUND` if unknown.
    pub async fn get_status(&self, match_id: u64) -> Result<Deployment, PlatformError> {
        self.deployments
            .read()
            .await
            .get(&match_id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("deployment for match {match_id} does not exist")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::node::NodeMetrics;
    use crate::transport::test_support::FakeTransport;
    use std::time::Duration;

    async fn registry_with(nodes: &[(&str, u32, u32, f32)]) -> NodeRegistry {
        let registry = NodeRegistry::new(Duration::from_secs(30));
        for (id, max_containers, container_count, cpu_load) in nodes {
            registry.register(NodeId((*id).to_string()), format!("http://{id}"), *max_containers).await;
            registry
                .heartbeat(
                    &NodeId((*id).to_string()),
                    NodeMetrics { container_count: *container_count, cpu_load: *cpu_load, ..NodeMetrics::default() },
                )
                .await
                .unwrap();
        }
        registry
    }

    fn spec() -> MatchSpec {
        MatchSpec { container_name: "c1".to_string(), module_names: vec!["physics".to_string()] }
    }

    #[tokio::test]
    async fn deploy_picks_the_least_loaded_healthy_node() {
        let nodes = registry_with(&[("busy", 10, 9, 0.1), ("idle", 10, 1, 0.1)]).await;
        let transport = Arc::new(FakeTransport::default());
        let deployer = MatchDeployer::new(transport);
        let deployment = deployer.deploy(spec(), &nodes).await.unwrap();
        assert_eq!(deployment.node_id, "idle");
        assert_eq!(deployment.status, DeploymentStatus::Active);
    }

    #[tokio::test]
    async fn deploy_with_no_healthy_nodes_is_upstream_unavailable() {
        let nodes = NodeRegistry::new(Duration::from_secs(30));
        let deployer = MatchDeployer::new(Arc::new(FakeTransport::default()));
        let err = deployer.deploy(spec(), &nodes).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn deploy_empty_modules_is_validation_error() {
        let nodes = registry_with(&[("n1", 10, 0, 0.0)]).await;
        let deployer = MatchDeployer::new(Arc::new(FakeTransport::default()));
        let bad = MatchSpec { container_name: "c1".to_string(), module_names: vec![] };
        let err = deployer.deploy(bad, &nodes).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn failed_node_ack_marks_deployment_failed() {
        let nodes = registry_with(&[("bad", 10, 0, 0.0)]).await;
        let transport = Arc::new(FakeTransport::default());
        transport.fail("bad");
        let deployer = MatchDeployer::new(transport);
        let deployment = deployer.deploy(spec(), &nodes).await.unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Failed);
    }

    #[tokio::test]
    async fn undeploy_then_get_status_reports_undeployed() {
        let nodes = registry_with(&[("n1", 10, 0, 0.0)]).await;
        let deployer = MatchDeployer::new(Arc::new(FakeTransport::default()));
        let deployment = deployer.deploy(spec(), &nodes).await.unwrap();
        let undeployed = deployer.undeploy(deployment.match_id).await.unwrap();
        assert_eq!(undeployed.status, DeploymentStatus::Undeployed);
        let status = deployer.get_status(deployment.match_id).await.unwrap();
        assert_eq!(status.status, DeploymentStatus::Undeployed);
    }

    #[tokio::test]
    async fn undeploy_unknown_match_is_not_found() {
        let deployer = MatchDeployer::new(Arc::new(FakeTransport::default()));
        let err = deployer.undeploy(9999).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
