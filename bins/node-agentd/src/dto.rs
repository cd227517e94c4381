//! JSON request/response shapes for the container-scoped HTTP surface, and the conversions between them and the core crates' domain types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sim_ecs::error::{ErrorKind, PlatformError};
use sim_ecs::module::{CommandPayload, FieldType, PayloadValue};
use sim_match::{Delta, HistoryInfo, Snapshot};
use sim_runtime::{CommandSummary, ContainerDescriptor, ContainerStatus, MatchDescriptor};

/// `POST /api/containers` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerRequest {
    pub name: String,
    #[serde(default)]
    pub module_names: Vec<String>,
}

/// `POST …/{cid}/matches` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    pub enabled_module_names: Vec<String>,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default = "default_entity_capacity")]
    pub entity_capacity: u64,
}

const fn default_max_players() -> u32 {
    16
}

const fn default_entity_capacity() -> u64 {
    1024
}

/// `POST …/{cid}/commands` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCommandRequest {
    pub command_name: String,
    pub match_id: u64,
    pub player_id: u64,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// `POST /api/auth/login` request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `POST /api/auth/refresh` request body.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/// `POST /api/tokens` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueApiTokenRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Response body shared by `login`/`refresh`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub role_names: Vec<String>,
}

/// Response body for `POST /api/tokens`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTokenResponse {
    pub id: String,
    pub token: String,
    pub name: String,
    pub scopes: Vec<String>,
}

/// Query parameters for `GET …/{cid}/matches/{mid}/snapshot`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotQuery {
    #[serde(default)]
    pub player_id: Option<u64>,
}

/// Query parameters for `POST …/{cid}/play`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayQuery {
    pub interval_ms: Option<u64>,
}

/// Query parameters for `GET …/snapshots/delta`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaQuery {
    pub from_tick: u64,
    pub to_tick: u64,
}

/// JSON view of a [`ContainerDescriptor`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerView {
    pub id: u64,
    pub name: String,
    pub status: &'static str,
    pub max_entities: u32,
    pub installed_modules: Vec<String>,
    pub match_ids: Vec<u64>,
    pub current_tick: u64,
}

impl From<ContainerDescriptor> for ContainerView {
    fn from(d: ContainerDescriptor) -> Self {
        let mut installed_modules: Vec<String> = d.installed_modules.into_iter().collect();
        installed_modules.sort();
        let mut match_ids: Vec<u64> = d.matches.into_iter().map(|m| m.0).collect();
        match_ids.sort_unstable();
        Self {
            id: d.id.0,
            name: d.name,
            status: status_name(d.status),
            max_entities: d.max_entities,
            installed_modules,
            match_ids,
            current_tick: d.current_tick,
        }
    }
}

const fn status_name(status: ContainerStatus) -> &'static str {
    match status {
        ContainerStatus::Created => "CREATED",
        ContainerStatus::Running => "RUNNING",
        ContainerStatus::Paused => "PAUSED",
        ContainerStatus::Stopped => "STOPPED",
        ContainerStatus::Deleted => "DELETED",
    }
}

/// JSON view of a [`MatchDescriptor`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: u64,
    pub enabled_modules: Vec<String>,
    pub players: Vec<u64>,
    pub max_players: u32,
    pub current_tick: u64,
    pub finished: bool,
}

impl From<MatchDescriptor> for MatchView {
    fn from(d: MatchDescriptor) -> Self {
        let mut players: Vec<u64> = d.players.into_iter().map(|p| p.0).collect();
        players.sort_unstable();
        Self {
            id: d.id.0,
            enabled_modules: d.enabled_modules,
            players,
            max_players: d.max_players,
            current_tick: d.current_tick,
            finished: d.finished,
        }
    }
}

/// JSON view of a [`CommandSummary`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandView {
    pub module_name: String,
    pub command_name: String,
    pub schema: BTreeMap<String, &'static str>,
}

impl From<CommandSummary> for CommandView {
    fn from(c: CommandSummary) -> Self {
        Self {
            module_name: c.module_name,
            command_name: c.command_name,
            schema: c.schema.into_iter().map(|(k, v)| (k, field_type_name(v))).collect(),
        }
    }
}

const fn field_type_name(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Int => "int",
        FieldType::Float => "float",
        FieldType::Bool => "bool",
        FieldType::String => "string",
    }
}

/// JSON view of a [`HistoryInfo`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryInfoView {
    pub count: usize,
    pub oldest_tick: Option<u64>,
    pub newest_tick: Option<u64>,
    pub capacity: usize,
}

impl From<HistoryInfo> for HistoryInfoView {
    fn from(i: HistoryInfo) -> Self {
        Self {
            count: i.count,
            oldest_tick: i.oldest_tick,
            newest_tick: i.newest_tick,
            capacity: i.capacity,
        }
    }
}

/// JSON view of a [`Snapshot`], pushed over the WebSocket and returned by
/// the on-demand snapshot/record endpoints.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    pub match_id: u64,
    pub tick: u64,
    pub entity_order: Vec<u64>,
    pub data: BTreeMap<String, BTreeMap<String, Vec<f32>>>,
}

impl From<Snapshot> for SnapshotView {
    fn from(s: Snapshot) -> Self {
        Self {
            match_id: s.match_id.0,
            tick: s.tick,
            entity_order: s.entity_order.into_iter().map(sim_ecs::entity::EntityId::raw).collect(),
            data: s.data,
        }
    }
}

/// JSON view of a [`Delta`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaView {
    pub match_id: u64,
    pub from_tick: u64,
    pub to_tick: u64,
    pub changes: BTreeMap<String, BTreeMap<String, Vec<(u32, f32)>>>,
    pub added_entities: Vec<u64>,
    pub removed_entities: Vec<u64>,
}

impl From<Delta> for DeltaView {
    fn from(d: Delta) -> Self {
        Self {
            match_id: d.match_id.0,
            from_tick: d.from_tick,
            to_tick: d.to_tick,
            changes: d.changes,
            added_entities: d.added_entities.into_iter().map(sim_ecs::entity::EntityId::raw).collect(),
            removed_entities: d.removed_entities.into_iter().map(sim_ecs::entity::EntityId::raw).collect(),
        }
    }
}

/// Parse a JSON object of command parameters into a [`CommandPayload`]
///.
pub fn payload_from_json(value: &serde_json::Value) -> Result<CommandPayload, PlatformError> {
    let serde_json::Value::Object(fields) = value else {
        if value.is_null() {
            return Ok(CommandPayload::new());
        }
        return Err(PlatformError::validation("command parameters must be a JSON object"));
    };
    let mut payload = CommandPayload::new();
    for (key, field_value) in fields {
        let parsed = match field_value {
            serde_json::Value::Bool(b) => PayloadValue::Bool(*b),
            serde_json::Value::String(s) => PayloadValue::String(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PayloadValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    PayloadValue::Float(f)
                } else {
                    return Err(PlatformError::new(
                        ErrorKind::Validation,
                        format!("field '{key}' is not a representable number"),
                    ));
                }
            }
            _ => {
                return Err(PlatformError::new(
                    ErrorKind::Validation,
                    format!("field '{key}' must be a bool, number, or string"),
                ))
            }
        };
        payload.insert(key.clone(), parsed);
    }
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn payload_from_json_converts_every_primitive_kind() {
        let value = serde_json::json!({"x": 1.5, "count": 3, "label": "a", "flag": true});
        let payload = payload_from_json(&value).unwrap();
        assert_eq!(payload.get("x"), Some(&PayloadValue::Float(1.5)));
        assert_eq!(payload.get("count"), Some(&PayloadValue::Int(3)));
        assert_eq!(payload.get("label"), Some(&PayloadValue::String("a".to_string())));
        assert_eq!(payload.get("flag"), Some(&PayloadValue::Bool(true)));
    }

    #[test]
    fn payload_from_json_rejects_non_object() {
        let value = serde_json::json!([1, 2, 3]);
        let err = payload_from_json(&value).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn payload_from_json_accepts_null_as_empty() {
        let payload = payload_from_json(&serde_json::Value::Null).unwrap();
        assert!(payload.is_empty());
    }
}
