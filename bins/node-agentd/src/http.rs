//! Container-scoped HTTP surface: container lifecycle, matches,
//! commands, snapshots, and auth, all mounted under `/api`.

use std::time::SystemTime;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sim_ecs::error::PlatformError;
use sim_match::{ContainerId, MatchId, PlayerId};

use crate::dto::{
    payload_from_json, ApiTokenResponse, AuthTokenResponse, CommandView, ContainerView,
    CreateContainerRequest, CreateMatchRequest, DeltaQuery, DeltaView, HistoryInfoView,
    IssueApiTokenRequest, LoginRequest, MatchView, PlayQuery, RefreshRequest, SnapshotQuery,
    SnapshotView, SubmitCommandRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Build the router for the container-scoped HTTP surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/containers", post(create_container).get(list_containers))
        .route("/api/containers/{cid}", get(get_container).delete(delete_container))
        .route("/api/containers/{cid}/start", post(start_container))
        .route("/api/containers/{cid}/stop", post(stop_container))
        .route("/api/containers/{cid}/pause", post(pause_container))
        .route("/api/containers/{cid}/resume", post(resume_container))
        .route("/api/containers/{cid}/tick", get(tick_container).post(tick_container))
        .route("/api/containers/{cid}/play", post(play_container))
        .route("/api/containers/{cid}/stop-auto", post(stop_auto_container))
        .route("/api/containers/{cid}/status", get(get_container))
        .route("/api/containers/{cid}/commands", get(list_commands).post(submit_command))
        .route("/api/containers/{cid}/matches", post(create_match))
        .route("/api/containers/{cid}/matches/{mid}", get(get_match).delete(delete_match))
        .route("/api/containers/{cid}/matches/{mid}/snapshot", get(get_snapshot))
        .route("/api/containers/{cid}/matches/{mid}/snapshots/record", post(record_snapshot))
        .route("/api/containers/{cid}/matches/{mid}/snapshots/history-info", get(history_info))
        .route("/api/containers/{cid}/matches/{mid}/snapshots/delta", get(snapshot_delta))
        .route("/api/containers/{cid}/matches/{mid}/snapshots/history", delete(clear_history))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/tokens", post(issue_api_token))
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

async fn container_handle(state: &AppState, cid: u64) -> Result<sim_runtime::ContainerHandle, PlatformError> {
    state
        .containers
        .get(ContainerId(cid))
        .await
        .ok_or_else(|| PlatformError::not_found(format!("container {cid} does not exist")))
}

async fn create_container(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateContainerRequest>,
) -> ApiResult<(StatusCode, Json<ContainerView>)> {
    require_scope(&state, &headers, "control-plane.match.create").await?;
    let handle = state.containers.create(body.name, body.module_names).await?;
    let descriptor = handle
        .describe()
        .await
        .ok_or_else(|| PlatformError::new(sim_ecs::error::ErrorKind::Internal, "container task is no longer running"))?;
    Ok((StatusCode::CREATED, Json(descriptor.into())))
}

async fn list_containers(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<ContainerView>>> {
    require_scope(&state, &headers, "control-plane.match.read").await?;
    let ids = state.containers.list().await;
    let mut views = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(handle) = state.containers.get(id).await {
            if let Some(descriptor) = handle.describe().await {
                views.push(descriptor.into());
            }
        }
    }
    Ok(Json(views))
}

async fn get_container(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cid): Path<u64>,
) -> ApiResult<Json<ContainerView>> {
    require_scope(&state, &headers, "control-plane.match.read").await?;
    let handle = container_handle(&state, cid).await?;
    let descriptor = handle
        .describe()
        .await
        .ok_or_else(|| PlatformError::new(sim_ecs::error::ErrorKind::Internal, "container task is no longer running"))?;
    Ok(Json(descriptor.into()))
}

async fn delete_container(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cid): Path<u64>,
) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.delete").await?;
    state.containers.delete(ContainerId(cid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_container(State(state): State<AppState>, headers: HeaderMap, Path(cid): Path<u64>) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.update").await?;
    container_handle(&state, cid).await?.start().await?;
    Ok(StatusCode::OK)
}

async fn stop_container(State(state): State<AppState>, headers: HeaderMap, Path(cid): Path<u64>) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.update").await?;
    container_handle(&state, cid).await?.stop().await?;
    Ok(StatusCode::OK)
}

async fn pause_container(State(state): State<AppState>, headers: HeaderMap, Path(cid): Path<u64>) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.update").await?;
    container_handle(&state, cid).await?.pause().await?;
    Ok(StatusCode::OK)
}

async fn resume_container(State(state): State<AppState>, headers: HeaderMap, Path(cid): Path<u64>) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.update").await?;
    container_handle(&state, cid).await?.resume().await?;
    Ok(StatusCode::OK)
}

async fn tick_container(State(state): State<AppState>, headers: HeaderMap, Path(cid): Path<u64>) -> ApiResult<Json<ContainerView>> {
    require_scope(&state, &headers, "control-plane.match.update").await?;
    let handle = container_handle(&state, cid).await?;
    handle.tick().await?;
    let descriptor = handle
        .describe()
        .await
        .ok_or_else(|| PlatformError::new(sim_ecs::error::ErrorKind::Internal, "container task is no longer running"))?;
    Ok(Json(descriptor.into()))
}

async fn play_container(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cid): Path<u64>,
    Query(query): Query<PlayQuery>,
) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.update").await?;
    let interval_ms = query.interval_ms.unwrap_or(sim_runtime::DEFAULT_AUTO_ADVANCE_INTERVAL_MS);
    container_handle(&state, cid).await?.play(interval_ms).await?;
    Ok(StatusCode::OK)
}

async fn stop_auto_container(State(state): State<AppState>, headers: HeaderMap, Path(cid): Path<u64>) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.update").await?;
    container_handle(&state, cid).await?.stop_auto().await?;
    Ok(StatusCode::OK)
}

async fn list_commands(State(state): State<AppState>, headers: HeaderMap, Path(cid): Path<u64>) -> ApiResult<Json<Vec<CommandView>>> {
    require_scope(&state, &headers, "control-plane.match.read").await?;
    let handle = container_handle(&state, cid).await?;
    Ok(Json(handle.list_commands().await.into_iter().map(Into::into).collect()))
}

async fn submit_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cid): Path<u64>,
    Json(body): Json<SubmitCommandRequest>,
) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "submit_commands").await?;
    let handle = container_handle(&state, cid).await?;
    let payload = payload_from_json(&body.parameters)?;
    handle
        .submit_command(MatchId(body.match_id), PlayerId(body.player_id), body.command_name, payload)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn create_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cid): Path<u64>,
    Json(body): Json<CreateMatchRequest>,
) -> ApiResult<(StatusCode, Json<u64>)> {
    require_scope(&state, &headers, "control-plane.match.create").await?;
    let handle = container_handle(&state, cid).await?;
    let match_id = handle
        .create_match(body.enabled_module_names, body.max_players, body.entity_capacity)
        .await?;
    Ok((StatusCode::CREATED, Json(match_id.0)))
}

async fn get_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cid, mid)): Path<(u64, u64)>,
) -> ApiResult<Json<MatchView>> {
    require_scope(&state, &headers, "control-plane.match.read").await?;
    let handle = container_handle(&state, cid).await?;
    let descriptor = handle.describe_match(MatchId(mid)).await?;
    Ok(Json(descriptor.into()))
}

async fn delete_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cid, mid)): Path<(u64, u64)>,
) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.delete").await?;
    container_handle(&state, cid).await?.delete_match(MatchId(mid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cid, mid)): Path<(u64, u64)>,
    Query(_query): Query<SnapshotQuery>,
) -> ApiResult<Json<Option<SnapshotView>>> {
    require_scope(&state, &headers, "view_snapshots").await?;
    let handle = container_handle(&state, cid).await?;
    Ok(Json(handle.current_snapshot(MatchId(mid)).await.map(Into::into)))
}

/// Advances the container by one tick and records the resulting snapshot.
///
/// `mid` must name a live match on `cid` or this returns `NOT_FOUND`, but the
/// tick it triggers is container-wide: every other live match on the same
/// container also advances and gets its snapshot recorded, since the tick
/// clock and command drain are owned by the container, not by a single
/// match. Callers that want to record exactly one match in isolation need a
/// container hosting only that match.
async fn record_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cid, mid)): Path<(u64, u64)>,
) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.update").await?;
    let handle = container_handle(&state, cid).await?;
    handle.describe_match(MatchId(mid)).await?;
    handle.tick().await?;
    Ok(StatusCode::OK)
}

async fn history_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cid, mid)): Path<(u64, u64)>,
) -> ApiResult<Json<HistoryInfoView>> {
    require_scope(&state, &headers, "view_snapshots").await?;
    let handle = container_handle(&state, cid).await?;
    let info = handle
        .history_info(MatchId(mid))
        .await
        .ok_or_else(|| PlatformError::not_found(format!("match {mid} does not exist")))?;
    Ok(Json(info.into()))
}

async fn snapshot_delta(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cid, mid)): Path<(u64, u64)>,
    Query(query): Query<DeltaQuery>,
) -> ApiResult<Json<DeltaView>> {
    require_scope(&state, &headers, "view_snapshots").await?;
    let handle = container_handle(&state, cid).await?;
    let delta = handle.delta(MatchId(mid), query.from_tick, query.to_tick).await?;
    Ok(Json(delta.into()))
}

async fn clear_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cid, mid)): Path<(u64, u64)>,
) -> ApiResult<StatusCode> {
    require_scope(&state, &headers, "control-plane.match.delete").await?;
    container_handle(&state, cid).await?.clear_history(MatchId(mid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<Json<AuthTokenResponse>> {
    let auth = state.auth.read().await;
    let token = auth.login(&body.username, &body.password, SystemTime::now())?;
    Ok(Json(AuthTokenResponse {
        token: token.signed_bearer,
        user_id: token.user_id.to_string(),
        username: token.username,
        role_names: token.role_names,
    }))
}

async fn refresh(State(state): State<AppState>, Json(body): Json<RefreshRequest>) -> ApiResult<Json<AuthTokenResponse>> {
    let auth = state.auth.read().await;
    let token = auth.refresh_token(&body.token, SystemTime::now())?;
    Ok(Json(AuthTokenResponse {
        token: token.signed_bearer,
        user_id: token.user_id.to_string(),
        username: token.username,
        role_names: token.role_names,
    }))
}

async fn issue_api_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IssueApiTokenRequest>,
) -> ApiResult<(StatusCode, Json<ApiTokenResponse>)> {
    let bearer = bearer_from(&headers);
    let auth = state.auth.read().await;
    let caller = auth_core::authorize(bearer.as_deref(), "control-plane.dashboard.read", &auth, SystemTime::now())?;
    let scopes = body.scopes.into_iter().collect::<rustc_hash::FxHashSet<_>>();
    let (token, plaintext) = auth.issue_api_token(caller.user_id, body.name, scopes, None, SystemTime::now());
    Ok((
        StatusCode::CREATED,
        Json(ApiTokenResponse {
            id: token.id.to_string(),
            token: plaintext,
            name: token.name,
            scopes: token.scopes.into_iter().collect(),
        }),
    ))
}

