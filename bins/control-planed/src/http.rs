//! Control-plane HTTP surface: node registry, cluster status,
//! module distribution, match deployment, autoscaler, and node proxying.

use std::time::SystemTime;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use control_plane::{MatchSpec, NodeId};
use sim_ecs::error::{ErrorKind, PlatformError};

use crate::dto::{
    AutoscalerStatusView, ClusterStatusView, DeployRequest, DeploymentView, HeartbeatRequest,
    ModuleArtifactView, NodeDistributionResultView, NodeView, RecommendationView,
    RegisterNodeRequest, UploadModuleRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Build the router for the control-plane HTTP surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/nodes/register", post(register_node))
        .route("/api/nodes/{nid}/heartbeat", put(heartbeat))
        .route("/api/nodes/{nid}/drain", post(drain_node))
        .route("/api/nodes/{nid}", delete(deregister_node))
        .route("/api/cluster/nodes", get(cluster_nodes))
        .route("/api/cluster/status", get(cluster_status))
        .route("/api/modules/{name}", get(list_module_versions))
        .route("/api/modules/{name}/{version}", post(upload_module).get(get_module).delete(delete_module))
        .route("/api/modules/{name}/{version}/distribute", post(distribute_module))
        .route("/api/modules/{name}/{version}/distribute/{nid}", post(distribute_module_to_node))
        .route("/api/v1/deploy", post(deploy))
        .route("/api/v1/deploy/{mid}", get(deploy_status).delete(undeploy))
        .route("/api/autoscaler/recommendation", get(autoscaler_recommendation))
        .route("/api/autoscaler/status", get(autoscaler_status))
        .route("/api/autoscaler/acknowledge", post(autoscaler_acknowledge))
        .route("/api/nodes/{nid}/proxy/{*path}", any(node_proxy))
        .with_state(state)
}

fn bearer_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(ToString::to_string)
}

async fn require_scope(state: &AppState, headers: &HeaderMap, scope: &str) -> Result<(), PlatformError> {
    let bearer = bearer_from(headers);
    let auth = state.auth.read().await;
    auth_core::authorize(bearer.as_deref(), scope, &auth, SystemTime::now())?;
    Ok(())
}

async fn register_node(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterNodeRequest>,
) -> ApiResult<(StatusCode, Json<NodeView>)> {
    require_scope(&state, &headers, "control-plane.node.register").await?;
    let node = state.nodes.register(NodeId(body.id), body.advertise_address, body.max_containers).await;
    Ok((StatusCode::CREATED, Json(node.into())))
}

async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(nid): Path<String>,
    Json(body): Json<HeartbeatRequest>,
) -> ApiResult<Json<NodeView>> {
    require_scope(&state, &headers, "control-plane.node.manage").await?;
    let node = state.nodes.heartbeat(&NodeId(nid), body.into()).await?;
    Ok(Json(node.into()))
}

async fn drain_node(State(state): State<AppState>, headers: HeaderMap, Path(nid): Path<String>) -> ApiResult<Json<NodeView>> {
    require_scope(&state, &headers, "control-plane.node.manage").await?;
    let node = state.nodes.drain(&NodeId(nid)).await?;
    Ok(Json(node.into()))
}

async fn deregister_node(State(state): State<AppState>, headers: HeaderMap, Path(nid): Path<String>) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.node.manage").await?;
    state.nodes.deregister(&NodeId(nid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cluster_nodes(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<NodeView>>> {
    require_scope(&state, &headers, "control-plane.cluster.read").await?;
    Ok(Json(state.nodes.list().await.into_iter().map(Into::into).collect()))
}

async fn cluster_status(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<ClusterStatusView>> {
    require_scope(&state, &headers, "control-plane.cluster.read").await?;
    let all = state.nodes.list().await;
    let healthy = state.nodes.list_healthy(SystemTime::now()).await;
    Ok(Json(ClusterStatusView { node_count: all.len(), healthy_count: healthy.len() }))
}

async fn upload_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version)): Path<(String, String)>,
    Json(body): Json<UploadModuleRequest>,
) -> ApiResult<(StatusCode, Json<ModuleArtifactView>)> {
    require_scope(&state, &headers, "control-plane.module.upload").await?;
    let blob = BASE64
        .decode(body.blob_base64.as_bytes())
        .map_err(|e| PlatformError::validation(format!("blob_base64 is not valid base64: {e}")))?;
    let artifact = state.modules.upload(name, version, blob).await;
    Ok((StatusCode::CREATED, Json(artifact.into())))
}

async fn list_module_versions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<ModuleArtifactView>>> {
    require_scope(&state, &headers, "control-plane.module.read").await?;
    Ok(Json(state.modules.list(&name).await.into_iter().map(Into::into).collect()))
}

async fn get_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version)): Path<(String, String)>,
) -> ApiResult<Json<ModuleArtifactView>> {
    require_scope(&state, &headers, "control-plane.module.read").await?;
    let artifact = state
        .modules
        .get(&name, &version)
        .await
        .ok_or_else(|| PlatformError::not_found(format!("module artifact '{name}@{version}' does not exist")))?;
    Ok(Json(artifact.into()))
}

async fn delete_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.module.delete").await?;
    state.modules.delete(&name, &version).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn distribute_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version)): Path<(String, String)>,
) -> ApiResult<Json<Vec<NodeDistributionResultView>>> {
    require_scope(&state, &headers, "control-plane.module.distribute").await?;
    let results = state.modules.distribute(&name, &version, None, &state.nodes).await?;
    Ok(Json(results.into_iter().map(Into::into).collect()))
}

async fn distribute_module_to_node(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version, nid)): Path<(String, String, String)>,
) -> ApiResult<Json<Vec<NodeDistributionResultView>>> {
    require_scope(&state, &headers, "control-plane.module.distribute").await?;
    let node_id = NodeId(nid);
    let results = state.modules.distribute(&name, &version, Some(&node_id), &state.nodes).await?;
    Ok(Json(results.into_iter().map(Into::into).collect()))
}

async fn deploy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DeployRequest>,
) -> ApiResult<(StatusCode, Json<DeploymentView>)> {
    require_scope(&state, &headers, "control-plane.deploy.create").await?;
    let spec = MatchSpec { container_name: body.container_name, module_names: body.module_names };
    let deployment = state.deployer.deploy(spec, &state.nodes).await?;
    Ok((StatusCode::CREATED, Json(deployment.into())))
}

async fn deploy_status(State(state): State<AppState>, headers: HeaderMap, Path(mid): Path<u64>) -> ApiResult<Json<DeploymentView>> {
    require_scope(&state, &headers, "control-plane.deploy.read").await?;
    let deployment = state.deployer.get_status(mid).await?;
    Ok(Json(deployment.into()))
}

async fn undeploy(State(state): State<AppState>, headers: HeaderMap, Path(mid): Path<u64>) -> ApiResult<Json<DeploymentView>> {
    require_scope(&state, &headers, "control-plane.deploy.delete").await?;
    let deployment = state.deployer.undeploy(mid).await?;
    Ok(Json(deployment.into()))
}

async fn autoscaler_recommendation(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<RecommendationView>> {
    require_scope(&state, &headers, "control-plane.autoscaler.read").await?;
    let recommendation = state.autoscaler.evaluate(&state.nodes).await;
    Ok(Json(recommendation.into()))
}

async fn autoscaler_status(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<AutoscalerStatusView>> {
    require_scope(&state, &headers, "control-plane.autoscaler.read").await?;
    let (recommendation, acknowledged) = state.autoscaler.status();
    Ok(Json(AutoscalerStatusView { recommendation: recommendation.map(Into::into), acknowledged }))
}

async fn autoscaler_acknowledge(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.autoscaler.manage").await?;
    state.autoscaler.acknowledge();
    Ok(StatusCode::NO_CONTENT)
}

async fn node_proxy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((nid, path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Response> {
    require_scope(&state, &headers, "control-plane.node.proxy").await?;

    let forwarded_headers: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();
    let request = control_plane::ProxyRequest {
        method: method.to_string(),
        sub_path: path,
        query: uri.query().map(ToString::to_string),
        headers: state.proxy.filter_headers(forwarded_headers),
        body: body.to_vec(),
    };

    let upstream = state.proxy.forward(&NodeId(nid), &state.nodes, request).await?;
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in upstream.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(upstream.body))
        .map_err(|e| PlatformError::new(ErrorKind::Internal, e.to_string()).into())
}
