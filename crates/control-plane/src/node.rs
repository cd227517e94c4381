//! Node registry: node records keyed by node id, TTL-derived health, and
//! status transitions.

use std::time::{Duration, SystemTime};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sim_ecs::error::{ErrorKind, PlatformError};
use tokio::sync::RwLock;

/// A node-wide-unique worker identifier, assigned by the operator at
/// registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

/// A node's administrative status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Heartbeating within TTL and accepting new deployments.
    Healthy,
    /// Heartbeat stale or explicitly marked unhealthy.
    Unhealthy,
    /// Administratively excluded from new deployments but still serving
    /// existing matches.
    Draining,
}

/// A node's self-reported load metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Live container count.
    pub container_count: u32,
    /// Live match count across all containers.
    pub match_count: u32,
    /// Fraction in `[0, 1]` (or beyond, if oversubscribed).
    pub cpu_load: f32,
    /// Resident memory in use, megabytes.
    pub memory_used_mb: u64,
    /// Total addressable memory, megabytes.
    pub memory_total_mb: u64,
}

/// A worker node's registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// The node's id.
    pub id: NodeId,
    /// Base URL the control plane dispatches to / proxies through.
    pub advertise_address: String,
    /// Administrative status, set by `register`/`drain`.
    pub status: NodeStatus,
    /// Maximum containers this node will host.
    pub max_containers: u32,
    /// Last reported load metrics.
    pub metrics: NodeMetrics,
    /// First registration time; preserved across re-registration.
    pub registered_at: SystemTime,
    /// Timestamp of the most recent heartbeat.
    pub last_heartbeat: SystemTime,
}

impl Node {
    /// Derive health from TTL and administrative status.
    #[must_use]
    pub fn is_healthy(&self, now: SystemTime, ttl: Duration) -> bool {
        self.status == NodeStatus::Healthy
            && now.duration_since(self.last_heartbeat).map(|age| age <= ttl).unwrap_or(true)
    }

    /// Fraction of configured capacity currently in use, for the deployer's
    /// node-selection ordering.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn load_fraction(&self) -> f32 {
        if self.max_containers == 0 {
            return f32::INFINITY;
        }
        self.metrics.container_count as f32 / self.max_containers as f32
    }
}

/// Single-writer, many-reader registry of worker nodes.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: RwLock<FxHashMap<NodeId, Node>>,
    ttl: Duration,
}

impl NodeRegistry {
    /// Create an empty registry with the given heartbeat TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { nodes: RwLock::default(), ttl }
    }

    /// Register (or re-register) a node. On re-registration, `registered_at`,
    /// `status`, and `metrics` are preserved; only address and capacity update
    ///.
    pub async fn register(&self, id: NodeId, advertise_address: String, max_containers: u32) -> Node {
        let mut nodes = self.nodes.write().await;
        let now = SystemTime::now();
        let entry = nodes.entry(id.clone()).or_insert_with(|| Node {
            id: id.clone(),
            advertise_address: advertise_address.clone(),
            status: NodeStatus::Healthy,
            max_containers,
            metrics: NodeMetrics::default(),
            registered_at: now,
            last_heartbeat: now,
        });
        entry.advertise_address = advertise_address;
        entry.max_containers = max_containers;
        entry.clone()
    }

    /// Update a node's metrics and heartbeat timestamp. `NODE_NOT_FOUND` if
    /// the node was never registered or has been deregistered.
    pub async fn heartbeat(&self, id: &NodeId, metrics: NodeMetrics) -> Result<Node, PlatformError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found(format!("node '{}' is not registered", id.0)))?;
        node.metrics = metrics;
        node.last_heartbeat = SystemTime::now();
        if node.status == NodeStatus::Unhealthy {
            node.status = NodeStatus::Healthy;
        }
        Ok(node.clone())
    }

    /// Mark a node `DRAINING`: it keeps existing matches but is excluded from
    /// new deployments.
    pub async fn drain(&self, id: &NodeId) -> Result<Node, PlatformError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found(format!("node '{}' is not registered", id.0)))?;
        node.status = NodeStatus::Draining;
        Ok(node.clone())
    }

    /// Remove a node from the registry entirely. `NODE_NOT_FOUND` if absent.
    pub async fn deregister(&self, id: &NodeId) -> Result<(), PlatformError> {
        let mut nodes = self.nodes.write().await;
        nodes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found(format!("node '{}' is not registered", id.0)))
    }

    /// Fetch a node's current record.
    pub async fn get(&self, id: &NodeId) -> Option<Node> {
        self.nodes.read().await.get(id).cloned()
    }

    /// List every registered node.
    pub async fn list(&self) -> Vec<Node> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// List nodes whose derived health is `HEALTHY` as of `now`.
    pub async fn list_healthy(&self, now: SystemTime) -> Vec<Node> {
        self.nodes
            .read()
            .await
            .values()
            .filter(|n| n.is_healthy(now, self.ttl))
            .cloned()
            .collect()
    }

    /// Idempotently transition any node whose heartbeat has exceeded the TTL
    /// from `HEALTHY` to `UNHEALTHY`. A background sweeper calls this on an
    /// interval; it never touches `DRAINING` nodes or fresh heartbeats
    ///.
    pub async fn sweep_stale(&self, now: SystemTime) {
        let mut nodes = self.nodes.write().await;
        for node in nodes.values_mut() {
            if node.status == NodeStatus::Healthy
                && now.duration_since(node.last_heartbeat).map(|age| age > self.ttl).unwrap_or(false)
            {
                node.status = NodeStatus::Unhealthy;
            }
        }
    }

    /// The configured heartbeat TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn node_id(s: &str) -> NodeId {
        NodeId(s.to_string())
    }

    #[tokio::test]
    async fn register_then_heartbeat_reports_healthy() {
        let registry = NodeRegistry::new(Duration::from_secs(30));
        registry.register(node_id("n1"), "http://n1".to_string(), 100).await;
        let node = registry.get(&node_id("n1")).await.unwrap();
        assert!(node.is_healthy(SystemTime::now(), registry.ttl()));
    }

    #[tokio::test]
    async fn stale_heartbeat_is_unhealthy_on_read_without_mutating_record() {
        let registry = NodeRegistry::new(Duration::from_secs(30));
        registry.register(node_id("n1"), "http://n1".to_string(), 100).await;
        let future = SystemTime::now() + Duration::from_secs(31);
        assert!(!registry.get(&node_id("n1")).await.unwrap().is_healthy(future, registry.ttl()));
        // stored status is untouched until heartbeat or explicit sweep:
        assert_eq!(registry.get(&node_id("n1")).await.unwrap().status, NodeStatus::Healthy);
    }

    #[tokio::test]
    async fn sweep_stale_transitions_status_idempotently() {
        let registry = NodeRegistry::new(Duration::from_millis(1));
        registry.register(node_id("n1"), "http://n1".to_string(), 100).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let now = SystemTime::now();
        registry.sweep_stale(now).await;
        assert_eq!(registry.get(&node_id("n1")).await.unwrap().status, NodeStatus::Unhealthy);
        registry.sweep_stale(now).await;
        assert_eq!(registry.get(&node_id("n1")).await.unwrap().status, NodeStatus::Unhealthy);
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_node_is_not_found() {
        let registry = NodeRegistry::new(Duration::from_secs(30));
        let err = registry.heartbeat(&node_id("ghost"), NodeMetrics::default()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn deregister_unknown_node_is_not_found() {
        let registry = NodeRegistry::new(Duration::from_secs(30));
        let err = registry.deregister(&node_id("ghost")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn reregistration_preserves_registered_at_and_status() {
        let registry = NodeRegistry::new(Duration::from_secs(30));
        let first = registry.register(node_id("n1"), "http://n1".to_string(), 100).await;
        registry.drain(&node_id("n1")).await.unwrap();
        let second = registry.register(node_id("n1"), "http://n1-new".to_string(), 200).await;
        assert_eq!(first.registered_at, second.registered_at);
        assert_eq!(second.status, NodeStatus::Draining);
        assert_eq!(second.advertise_address, "http://n1-new");
        assert_eq!(second.max_containers, 200);
    }
}
