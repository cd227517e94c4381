//! JSON request/response shapes for the control-plane HTTP surface, and the conversions between them and the `control-plane` crate's
//! domain types.

use std::time::{SystemTime, UNIX_EPOCH};

use control_plane::{Deployment, DeploymentStatus, ModuleArtifact, Node, NodeDistributionResult, NodeMetrics, NodeStatus, Recommendation};
use serde::{Deserialize, Serialize};

fn epoch_seconds(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// `POST /api/nodes/register` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterNodeRequest {
    pub id: String,
    pub advertise_address: String,
    #[serde(default = "default_max_containers")]
    pub max_containers: u32,
}

const fn default_max_containers() -> u32 {
    10
}

/// `PUT /api/nodes/{nid}/heartbeat` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub container_count: u32,
    #[serde(default)]
    pub match_count: u32,
    #[serde(default)]
    pub cpu_load: f32,
    #[serde(default)]
    pub memory_used_mb: u64,
    #[serde(default)]
    pub memory_total_mb: u64,
}

impl From<HeartbeatRequest> for NodeMetrics {
    fn from(r: HeartbeatRequest) -> Self {
        Self {
            container_count: r.container_count,
            match_count: r.match_count,
            cpu_load: r.cpu_load,
            memory_used_mb: r.memory_used_mb,
            memory_total_mb: r.memory_total_mb,
        }
    }
}

/// JSON view of [`NodeMetrics`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetricsView {
    pub container_count: u32,
    pub match_count: u32,
    pub cpu_load: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}

impl From<NodeMetrics> for NodeMetricsView {
    fn from(m: NodeMetrics) -> Self {
        Self {
            container_count: m.container_count,
            match_count: m.match_count,
            cpu_load: m.cpu_load,
            memory_used_mb: m.memory_used_mb,
            memory_total_mb: m.memory_total_mb,
        }
    }
}

/// JSON view of a [`Node`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: String,
    pub advertise_address: String,
    pub status: &'static str,
    pub max_containers: u32,
    pub metrics: NodeMetricsView,
    pub registered_at: u64,
    pub last_heartbeat: u64,
}

impl From<Node> for NodeView {
    fn from(n: Node) -> Self {
        Self {
            id: n.id.0,
            advertise_address: n.advertise_address,
            status: status_name(n.status),
            max_containers: n.max_containers,
            metrics: n.metrics.into(),
            registered_at: epoch_seconds(n.registered_at),
            last_heartbeat: epoch_seconds(n.last_heartbeat),
        }
    }
}

const fn status_name(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Healthy => "HEALTHY",
        NodeStatus::Unhealthy => "UNHEALTHY",
        NodeStatus::Draining => "DRAINING",
    }
}

/// JSON view of the cluster as a whole, for `GET /api/cluster/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusView {
    pub node_count: usize,
    pub healthy_count: usize,
}

/// `POST /api/modules/{name}/{version}` request body: the artifact blob,
/// base64-encoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadModuleRequest {
    pub blob_base64: String,
}

/// JSON view of a [`ModuleArtifact`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleArtifactView {
    pub name: String,
    pub version: String,
    pub blob_hash: String,
    pub size_bytes: u64,
    pub uploaded_at: u64,
}

impl From<ModuleArtifact> for ModuleArtifactView {
    fn from(a: ModuleArtifact) -> Self {
        Self {
            name: a.name,
            version: a.version,
            blob_hash: a.blob_hash,
            size_bytes: a.size_bytes,
            uploaded_at: epoch_seconds(a.uploaded_at),
        }
    }
}

/// JSON view of a [`NodeDistributionResult`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDistributionResultView {
    pub node_id: String,
    pub outcome: String,
}

impl From<NodeDistributionResult> for NodeDistributionResultView {
    fn from(r: NodeDistributionResult) -> Self {
        Self { node_id: r.node_id, outcome: r.outcome }
    }
}

/// `POST /api/v1/deploy` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub container_name: String,
    pub module_names: Vec<String>,
}

/// JSON view of a [`Deployment`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub match_id: u64,
    pub container_id: Option<u64>,
    pub node_id: String,
    pub module_names: Vec<String>,
    pub created_at: u64,
    pub status: &'static str,
}

impl From<Deployment> for DeploymentView {
    fn from(d: Deployment) -> Self {
        Self {
            match_id: d.match_id,
            container_id: d.container_id,
            node_id: d.node_id,
            module_names: d.module_names,
            created_at: epoch_seconds(d.created_at),
            status: deployment_status_name(d.status),
        }
    }
}

const fn deployment_status_name(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Pending => "PENDING",
        DeploymentStatus::Active => "ACTIVE",
        DeploymentStatus::Failed => "FAILED",
        DeploymentStatus::Undeployed => "UNDEPLOYED",
    }
}

/// JSON view of a [`Recommendation`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationView {
    pub action: &'static str,
    pub count: u32,
}

impl From<Recommendation> for RecommendationView {
    fn from(r: Recommendation) -> Self {
        match r {
            Recommendation::ScaleUp(n) => Self { action: "SCALE_UP", count: n },
            Recommendation::ScaleDown(n) => Self { action: "SCALE_DOWN", count: n },
            Recommendation::Steady => Self { action: "STEADY", count: 0 },
        }
    }
}

/// JSON view for `GET /api/autoscaler/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerStatusView {
    pub recommendation: Option<RecommendationView>,
    pub acknowledged: bool,
}
