//! The boundary between control-plane logic and the actual wire calls to a
//! node. `control-plane` depends only on this trait;
//! `bins/control-planed` supplies the concrete `reqwest`-based implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// What the deployer asks a node to do when placing a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMatchRequest {
    /// Container name to create (or reuse) on the target node.
    pub container_name: String,
    /// Modules to enable for the new match.
    pub module_names: Vec<String>,
}

/// What the node reports back once it has created the container/match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMatchAck {
    /// The container id the node assigned.
    pub container_id: u64,
    /// The match id the node assigned.
    pub match_id: u64,
}

/// Outcome of distributing one artifact to one node.
#[derive(Debug, Clone)]
pub enum DistributeOutcome {
    /// The node acknowledged receipt.
    Acked,
    /// The node rejected or failed to receive the artifact.
    Failed(String),
}

/// Everything the control plane needs to ask of a node over the (external,
/// out-of-scope) transport. Implemented with whatever HTTP client the
/// binary chooses; never implemented inside `control-plane` itself.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Push a module artifact's bytes to `node` and await acknowledgment.
    async fn push_artifact(&self, node: &NodeId, name: &str, version: &str, blob: &[u8]) -> DistributeOutcome;

    /// Ask `node` to create a container+match for a deployment.
    async fn create_match(&self, node: &NodeId, request: CreateMatchRequest) -> Result<CreateMatchAck, String>;

    /// Ask `node` to undeploy (stop + delete) a previously created match.
    async fn undeploy_match(&self, node: &NodeId, container_id: u64, match_id: u64) -> Result<(), String>;

    /// Forward an arbitrary proxied request; see [`crate::proxy::NodeProxy`].
    async fn forward(&self, node: &NodeId, request: crate::proxy::ProxyRequest) -> Result<crate::proxy::ProxyResponse, String>;
}

#[cfg(test)]
pub mod test_support {
    //! An in-memory [`NodeTransport`] double for deployer/distributor tests.

    use std::sync::Mutex;

    use super::{CreateMatchAck, CreateMatchRequest, DistributeOutcome, NodeTransport};
    use crate::node::NodeId;
    use crate::proxy::{ProxyRequest, ProxyResponse};
    use async_trait::async_trait;
    use rustc_hash::FxHashSet;

    /// A transport double whose behavior is controlled by the test: nodes in
    /// `failing_nodes` fail every call; everything else succeeds.
    #[derive(Default)]
    pub struct FakeTransport {
        /// Node ids that should fail every call made to them.
        pub failing_nodes: Mutex<FxHashSet<String>>,
        /// Monotonic ids handed out by `create_match`.
        pub next_id: Mutex<u64>,
    }

    impl FakeTransport {
        /// Mark a node as failing (for negative-path tests).
        pub fn fail(&self, node: &str) {
            self.failing_nodes.lock().unwrap_or_else(|e| e.into_inner()).insert(node.to_string());
        }
    }

    #[async_trait]
    impl NodeTransport for FakeTransport {
        async fn push_artifact(&self, node: &NodeId, _name: &str, _version: &str, _blob: &[u8]) -> DistributeOutcome {
            if self.failing_nodes.lock().unwrap_or_else(|e| e.into_inner()).contains(&node.0) {
                DistributeOutcome::Failed("simulated failure".to_string())
            } else {
                DistributeOutcome::Acked
            }
        }

        async fn create_match(&self, node: &NodeId, _request: CreateMatchRequest) -> Result<CreateMatchAck, String> {
            if self.failing_nodes.lock().unwrap_or_else(|e| e.into_inner()).contains(&node.0) {
                return Err("simulated failure".to_string());
            }
            let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            Ok(CreateMatchAck { container_id: *next, match_id: *next })
        }

        async fn undeploy_match(&self, node: &NodeId, _container_id: u64, _match_id: u64) -> Result<(), String> {
            if self.failing_nodes.lock().unwrap_or_else(|e| e.into_inner()).contains(&node.0) {
                return Err("simulated failure".to_string());
            }
            Ok(())
        }

        async fn forward(&self, _node: &NodeId, request: ProxyRequest) -> Result<ProxyResponse, String> {
            Ok(ProxyResponse {
                status: 200,
                headers: vec![],
                body: request.body,
            })
        }
    }
}
