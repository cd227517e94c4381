//! Module artifact storage and distribution to nodes.

use std::sync::Arc;
use std::time::SystemTime;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sim_ecs::error::{ErrorKind, PlatformError};
use tokio::sync::RwLock;

use crate::node::{NodeId, NodeRegistry};
use crate::transport::{DistributeOutcome, NodeTransport};

/// A stored module artifact, keyed by `(name, version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleArtifact {
    /// The module's name.
    pub name: String,
    /// The artifact's version string.
    pub version: String,
    /// Content hash of the blob, used as an integrity/identity check.
    pub blob_hash: String,
    /// Size of the stored blob in bytes.
    pub size_bytes: u64,
    /// Upload time.
    pub uploaded_at: SystemTime,
}

/// Per-node distribution outcome, reported back to the caller of `distribute`
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDistributionResult {
    /// The node the artifact was pushed to.
    pub node_id: String,
    /// Whether the node acknowledged, and if not, why.
    pub outcome: String,
}

/// Catalog of uploaded module artifacts plus distribution to nodes. `distribute` fans out to every `HEALTHY` node (or one, if given)
/// and collects per-node acknowledgment without failing the whole call when
/// a subset of nodes are unreachable.
pub struct ModuleDistributor {
    artifacts: RwLock<FxHashMap<(String, String), (ModuleArtifact, Vec<u8>)>>,
    transport: Arc<dyn NodeTransport>,
}

impl ModuleDistributor {
    /// Create an empty distributor using `transport` to reach nodes.
    #[must_use]
    pub fn new(transport: Arc<dyn NodeTransport>) -> Self {
        Self { artifacts: RwLock::default(), transport }
    }

    /// Store an artifact's blob, computing its hash and size.
    pub async fn upload(&self, name: impl Into<String>, version: impl Into<String>, blob: Vec<u8>) -> ModuleArtifact {
        let name = name.into();
        let version = version.into();
        let blob_hash = blob_hash_hex(&blob);
        let artifact = ModuleArtifact {
            name: name.clone(),
            version: version.clone(),
            blob_hash,
            size_bytes: blob.len() as u64,
            uploaded_at: SystemTime::now(),
        };
        self.artifacts.write().await.insert((name, version), (artifact.clone(), blob));
        artifact
    }

    /// List every known version of a module, newest upload first.
    pub async fn list(&self, name: &str) -> Vec<ModuleArtifact> {
        let mut versions: Vec<ModuleArtifact> = self
            .artifacts
            .read()
            .await
            .values()
            .filter(|(artifact, _)| artifact.name == name)
            .map(|(artifact, _)| artifact.clone())
            .collect();
        versions.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        versions
    }

    /// Fetch one artifact's record.
    pub async fn get(&self, name: &str, version: &str) -> Option<ModuleArtifact> {
        self.artifacts.read().await.get(&(name.to_string(), version.to_string())).map(|(a, _)| a.clone())
    }

    /// Remove an artifact. `NOT_FOUND` if it was never uploaded.
    pub async fn delete(&self, name: &str, version: &str) -> Result<(), PlatformError> {
        self.artifacts
            .write()
            .await
            .remove(&(name.to_string(), version.to_string()))
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found(format!("module artifact '{name}@{version}' does not exist")))
    }

    /// Distribute an artifact to one node, or every `HEALTHY` node when
    /// `node_id` is `None`. `NOT_FOUND` if the artifact is unknown.
    pub async fn distribute(
        &self,
        name: &str,
        version: &str,
        node_id: Option<&NodeId>,
        nodes: &NodeRegistry,
    ) -> Result<Vec<NodeDistributionResult>, PlatformError> {
        let blob = self
            .artifacts
            .read()
            .await
            .get(&(name.to_string(), version.to_string()))
            .map(|(_, blob)| blob.clone())
            .ok_or_else(|| PlatformError::not_found(format!("module artifact '{name}@{version}' does not exist")))?;

        let targets = match node_id {
            Some(id) => {
                let node = nodes
                    .get(id)
                    .await
                    .ok_or_else(|| PlatformError::not_found(format!("node '{}' is not registered", id.0)))?;
                vec![node.id]
            }
            None => nodes.list_healthy(SystemTime::now()).await.into_iter().map(|n| n.id).collect(),
        };

        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = self.transport.push_artifact(&target, name, version, &blob).await;
            results.push(NodeDistributionResult {
                node_id: target.0,
                outcome: match outcome {
                    DistributeOutcome::Acked => "ACKED".to_string(),
                    DistributeOutcome::Failed(reason) => reason,
                },
            });
        }
        Ok(results)
    }
}

fn blob_hash_hex(blob: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(blob);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::test_support::FakeTransport;
    use std::time::Duration;

    fn distributor() -> (ModuleDistributor, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::default());
        (ModuleDistributor::new(transport.clone()), transport)
    }

    #[tokio::test]
    async fn upload_then_list_returns_the_version() {
        let (dist, _) = distributor();
        dist.upload("physics", "1.0.0", vec![1, 2, 3]).await;
        let versions = dist.list("physics").await;
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, "1.0.0");
        assert_eq!(versions[0].size_bytes, 3);
    }

    #[tokio::test]
    async fn distribute_unknown_artifact_is_not_found() {
        let (dist, _) = distributor();
        let nodes = NodeRegistry::new(Duration::from_secs(30));
        let err = dist.distribute("missing", "1.0.0", None, &nodes).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn distribute_reports_partial_success_per_node() {
        let (dist, transport) = distributor();
        dist.upload("physics", "1.0.0", vec![1, 2, 3]).await;
        let nodes = NodeRegistry::new(Duration::from_secs(30));
        nodes.register(NodeId("n1".to_string()), "http://n1".to_string(), 10).await;
        nodes.register(NodeId("n2".to_string()), "http://n2".to_string(), 10).await;
        transport.fail("n2");

        let results = dist.distribute("physics", "1.0.0", None, &nodes).await.unwrap();
        assert_eq!(results.len(), 2);
        let n2 = results.iter().find(|r| r.node_id == "n2").unwrap();
        assert_ne!(n2.outcome, "ACKED");
        let n1 = results.iter().find(|r| r.node_id == "n1").unwrap();
        assert_eq!(n1.outcome, "ACKED");
    }

    #[tokio::test]
    async fn distribute_to_single_named_node() {
        let (dist, _) = distributor();
        dist.upload("physics", "1.0.0", vec![1, 2, 3]).await;
        let nodes = NodeRegistry::new(Duration::from_secs(30));
        nodes.register(NodeId("n1".to_string()), "http://n1".to_string(), 10).await;
        let results = dist
            .distribute("physics", "1.0.0", Some(&NodeId("n1".to_string())), &nodes)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id, "n1");
    }
}
