//! The snapshot engine: capture, bounded history, and tick-to-tick deltas.
//!
//! A snapshot is every non-private component's values, aligned to the
//! match's ascending entity order at capture time; the history ring and
//! delta computation let a client reconstruct any retained tick or pull
//! the minimal diff between two retained ticks.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use sim_ecs::component::PermissionLevel;
use sim_ecs::entity::EntityId;
use sim_ecs::error::{ErrorKind, PlatformError};
use sim_ecs::module::ModuleDescriptor;
use sim_ecs::store::ComponentStore;

use crate::types::MatchId;

/// Default number of ticks retained per match.
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Component values for one module, keyed by component name, aligned
/// index-for-index with the owning [`Snapshot::entity_order`].
pub type ComponentTable = BTreeMap<String, Vec<f32>>;

/// A full capture of a match's visible component data at one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The match this snapshot was captured from.
    pub match_id: MatchId,
    /// The container tick this snapshot was captured at.
    pub tick: u64,
    /// Every live entity, in ascending id order, at capture time.
    pub entity_order: Vec<EntityId>,
    /// `module_name -> component_name -> values`, values aligned to `entity_order`.
    pub data: BTreeMap<String, ComponentTable>,
}

fn capture_with(
    match_id: MatchId,
    tick: u64,
    entity_order: &[EntityId],
    modules: &[Arc<ModuleDescriptor>],
    store: &ComponentStore,
    include: impl Fn(&str, PermissionLevel) -> bool,
) -> Snapshot {
    let mut data = BTreeMap::new();
    for module in modules {
        let mut table = ComponentTable::new();
        for component in &module.components {
            if !include(&module.name, component.permission_level) {
                continue;
            }
            let values: Vec<f32> = entity_order
                .iter()
                .map(|entity| store.get(*entity, component.id))
                .collect();
            table.insert(component.name.clone(), values);
        }
        if !table.is_empty() {
            data.insert(module.name.clone(), table);
        }
    }
    Snapshot {
        match_id,
        tick,
        entity_order: entity_order.to_vec(),
        data,
    }
}

/// Capture every non-`Private` component of `modules`, aligned to
/// `entity_order`.
#[must_use]
pub fn capture(
    match_id: MatchId,
    tick: u64,
    entity_order: &[EntityId],
    modules: &[Arc<ModuleDescriptor>],
    store: &ComponentStore,
) -> Snapshot {
    capture_with(match_id, tick, entity_order, modules, store, |_, level| {
        level != PermissionLevel::Private
    })
}

/// Capture, additionally omitting `Private` and `Owner` components for any
/// module the requesting player does not own.
///
/// "Owning" a module is a per-player grant tracked by the caller (typically
/// empty for spectators and regular players); an empty `owned_modules` is
/// the conservative default that hides every `Owner`-level component.
#[must_use]
pub fn filtered_capture(
    match_id: MatchId,
    tick: u64,
    entity_order: &[EntityId],
    modules: &[Arc<ModuleDescriptor>],
    store: &ComponentStore,
    owned_modules: &FxHashSet<String>,
) -> Snapshot {
    capture_with(match_id, tick, entity_order, modules, store, |module_name, level| {
        match level {
            PermissionLevel::Private | PermissionLevel::Owner => owned_modules.contains(module_name),
            PermissionLevel::Read | PermissionLevel::Write => true,
        }
    })
}

/// Summary of a match's retained snapshot history, returned by
/// [`SnapshotHistory::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryInfo {
    /// Number of ticks currently retained.
    pub count: usize,
    /// The oldest retained tick, if any.
    pub oldest_tick: Option<u64>,
    /// The newest retained tick, if any.
    pub newest_tick: Option<u64>,
    /// The configured retention capacity.
    pub capacity: usize,
}

/// A bounded, tick-indexed ring of a single match's snapshots.
///
/// Evicts the oldest retained tick once more than `capacity` snapshots are
/// held.
#[derive(Debug)]
pub struct SnapshotHistory {
    capacity: usize,
    by_tick: BTreeMap<u64, Snapshot>,
}

impl SnapshotHistory {
    /// Create an empty history with the given retention capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            by_tick: BTreeMap::new(),
        }
    }

    /// Record a snapshot, evicting the oldest retained tick(s) if the
    /// history would otherwise exceed capacity.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.by_tick.insert(snapshot.tick, snapshot);
        while self.by_tick.len() > self.capacity {
            if let Some(&oldest) = self.by_tick.keys().next() {
                self.by_tick.remove(&oldest);
            }
        }
    }

    /// Look up a previously recorded snapshot by tick.
    #[must_use]
    pub fn get(&self, tick: u64) -> Option<&Snapshot> {
        self.by_tick.get(&tick)
    }

    /// The most recently recorded snapshot, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&Snapshot> {
        self.by_tick.values().next_back()
    }

    /// Summarize the current retention window.
    #[must_use]
    pub fn info(&self) -> HistoryInfo {
        HistoryInfo {
            count: self.by_tick.len(),
            oldest_tick: self.by_tick.keys().next().copied(),
            newest_tick: self.by_tick.keys().next_back().copied(),
            capacity: self.capacity,
        }
    }

    /// Drop every retained snapshot.
    pub fn clear(&mut self) {
        self.by_tick.clear();
    }
}

/// A sparse component change: the index into the target snapshot's
/// `entity_order`, and the new value.
pub type SparseChanges = BTreeMap<String, Vec<(u32, f32)>>;

/// The difference between two snapshots of the same match.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// The match this delta describes.
    pub match_id: MatchId,
    /// The earlier tick.
    pub from_tick: u64,
    /// The later tick.
    pub to_tick: u64,
    /// `module_name -> component_name -> [(entity index in `to`, new value)]`.
    pub changes: BTreeMap<String, SparseChanges>,
    /// Entities present at `to_tick` but not at `from_tick`, ascending.
    pub added_entities: Vec<EntityId>,
    /// Entities present at `from_tick` but not at `to_tick`, ascending.
    pub removed_entities: Vec<EntityId>,
}

/// Compute the delta between two recorded snapshots of the same match.
///
/// Indices in [`Delta::changes`] refer to positions in the `to` snapshot's
/// `entity_order`. A component value absent in `from` (entity didn't exist,
/// or the module/component wasn't captured) reads as `0.0`, matching the
/// store's own absence convention.
pub fn delta(
    history: &SnapshotHistory,
    match_id: MatchId,
    from_tick: u64,
    to_tick: u64,
) -> Result<Delta, PlatformError> {
    let from = history
        .get(from_tick)
        .ok_or_else(|| PlatformError::not_found(format!("no snapshot at tick {from_tick}")))?;
    let to = history
        .get(to_tick)
        .ok_or_else(|| PlatformError::not_found(format!("no snapshot at tick {to_tick}")))?;

    let from_set: FxHashSet<EntityId> = from.entity_order.iter().copied().collect();
    let to_set: FxHashSet<EntityId> = to.entity_order.iter().copied().collect();

    let mut added_entities: Vec<EntityId> = to_set.difference(&from_set).copied().collect();
    added_entities.sort_unstable();
    let mut removed_entities: Vec<EntityId> = from_set.difference(&to_set).copied().collect();
    removed_entities.sort_unstable();

    let mut changes: BTreeMap<String, SparseChanges> = BTreeMap::new();
    for (module_name, to_table) in &to.data {
        let from_table = from.data.get(module_name);
        let mut module_changes = SparseChanges::new();
        for (component_name, to_values) in to_table {
            let from_values = from_table.and_then(|t| t.get(component_name));
            let from_by_entity: FxHashMap<EntityId, f32> = match from_values {
                Some(values) => from.entity_order.iter().copied().zip(values.iter().copied()).collect(),
                None => FxHashMap::default(),
            };
            let mut sparse = Vec::new();
            for (index, entity) in to.entity_order.iter().enumerate() {
                let new_value = to_values.get(index).copied().unwrap_or(0.0);
                let old_value = from_by_entity.get(entity).copied().unwrap_or(0.0);
                if (new_value - old_value).abs() > f32::EPSILON {
                    #[allow(clippy::cast_possible_truncation)]
                    sparse.push((index as u32, new_value));
                }
            }
            if !sparse.is_empty() {
                module_changes.insert(component_name.clone(), sparse);
            }
        }
        if !module_changes.is_empty() {
            changes.insert(module_name.clone(), module_changes);
        }
    }

    Ok(Delta {
        match_id,
        from_tick,
        to_tick,
        changes,
        added_entities,
        removed_entities,
    })
}

/// Owns one [`SnapshotHistory`] per match, the unit the rest of the
/// platform actually depends on for `record`/`history_info`/`delta`.
#[derive(Debug, Default)]
pub struct SnapshotEngine {
    default_capacity: usize,
    histories: FxHashMap<MatchId, SnapshotHistory>,
}

impl SnapshotEngine {
    /// Create an engine with the given default per-match retention capacity.
    #[must_use]
    pub fn new(default_capacity: usize) -> Self {
        Self {
            default_capacity: default_capacity.max(1),
            histories: FxHashMap::default(),
        }
    }

    /// Record a snapshot, creating the match's history on first use.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.histories
            .entry(snapshot.match_id)
            .or_insert_with(|| SnapshotHistory::new(self.default_capacity))
            .record(snapshot);
    }

    /// Drop all retained history for a match. A no-op if the match has no history yet.
    pub fn clear(&mut self, match_id: MatchId) {
        self.histories.remove(&match_id);
    }

    /// Summarize a match's retained history. Returns an empty summary for a
    /// match with no recorded snapshots yet.
    #[must_use]
    pub fn history_info(&self, match_id: MatchId) -> HistoryInfo {
        self.histories.get(&match_id).map_or(
            HistoryInfo {
                count: 0,
                oldest_tick: None,
                newest_tick: None,
                capacity: self.default_capacity,
            },
            SnapshotHistory::info,
        )
    }

    /// Compute the delta between two ticks of the same match.
    pub fn delta(&self, match_id: MatchId, from_tick: u64, to_tick: u64) -> Result<Delta, PlatformError> {
        let history = self.histories.get(&match_id).ok_or_else(|| {
            PlatformError::new(
                ErrorKind::NotFound,
                format!("match {match_id:?} has no recorded history"),
            )
        })?;
        delta(history, match_id, from_tick, to_tick)
    }

    /// Drop all retained history for a match, e.g. on deletion.
    pub fn clear_history(&mut self, match_id: MatchId) {
        self.histories.remove(&match_id);
    }

    /// The most recently recorded snapshot for a match, if any tick has
    /// been captured yet.
    #[must_use]
    pub fn latest(&self, match_id: MatchId) -> Option<&Snapshot> {
        self.histories.get(&match_id).and_then(SnapshotHistory::latest)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sim_ecs::component::{ComponentDescriptor, ComponentId};
    use sim_ecs::module::{FnSystem, ModuleDescriptor};

    fn module(name: &str, components: Vec<(u64, PermissionLevel)>) -> Arc<ModuleDescriptor> {
        let refs: Vec<Arc<ComponentDescriptor>> = components
            .into_iter()
            .enumerate()
            .map(|(i, (id, level))| {
                Arc::new(ComponentDescriptor {
                    id: ComponentId(id),
                    name: format!("C{i}"),
                    owner_module: name.to_string(),
                    permission_level: level,
                })
            })
            .collect();
        Arc::new(ModuleDescriptor {
            name: name.to_string(),
            flag_component: refs[0].clone(),
            components: refs,
            systems: vec![Arc::new(FnSystem::new("noop", |_v| {}))],
            commands: Vec::new(),
        })
    }

    #[test]
    fn capture_excludes_private_components() {
        let mut store = ComponentStore::new();
        let m = module("mod", vec![(0, PermissionLevel::Private), (1, PermissionLevel::Read)]);
        store.attach(EntityId(1), ComponentId(0), 9.0);
        store.attach(EntityId(1), ComponentId(1), 2.0);
        let snap = capture(MatchId(1), 5, &[EntityId(1)], &[m], &store);
        let table = &snap.data["mod"];
        assert!(!table.contains_key("C0"));
        assert_eq!(table["C1"], vec![2.0]);
    }

    #[test]
    fn filtered_capture_hides_owner_components_from_non_owners() {
        let mut store = ComponentStore::new();
        let m = module("mod", vec![(0, PermissionLevel::Owner)]);
        store.attach(EntityId(1), ComponentId(0), 1.0);

        let none_owned = FxHashSet::default();
        let snap = filtered_capture(MatchId(1), 0, &[EntityId(1)], &[m.clone()], &store, &none_owned);
        assert!(!snap.data.contains_key("mod"));

        let mut owns_mod = FxHashSet::default();
        owns_mod.insert("mod".to_string());
        let snap = filtered_capture(MatchId(1), 0, &[EntityId(1)], &[m], &store, &owns_mod);
        assert_eq!(snap.data["mod"]["C0"], vec![1.0]);
    }

    #[test]
    fn history_evicts_oldest_beyond_capacity() {
        let mut history = SnapshotHistory::new(2);
        for tick in 0..4u64 {
            history.record(Snapshot {
                match_id: MatchId(1),
                tick,
                entity_order: vec![],
                data: BTreeMap::new(),
            });
        }
        let info = history.info();
        assert_eq!(info.count, 2);
        assert_eq!(info.oldest_tick, Some(2));
        assert_eq!(info.newest_tick, Some(3));
    }

    #[test]
    fn delta_reports_only_the_entity_that_moved() {
        let mut engine = SnapshotEngine::new(DEFAULT_HISTORY_CAPACITY);
        let entities = vec![EntityId(1), EntityId(2), EntityId(3)];
        let mut pos = BTreeMap::new();
        pos.insert("POSITION_X".to_string(), vec![0.0, 2.0, 4.0]);
        pos.insert("POSITION_Y".to_string(), vec![0.0, 2.0, 4.0]);
        let mut data = BTreeMap::new();
        data.insert("movement".to_string(), pos);
        engine.record(Snapshot {
            match_id: MatchId(1),
            tick: 0,
            entity_order: entities.clone(),
            data,
        });

        let mut pos2 = BTreeMap::new();
        pos2.insert("POSITION_X".to_string(), vec![0.0, 5.0, 4.0]);
        pos2.insert("POSITION_Y".to_string(), vec![0.0, 5.0, 4.0]);
        let mut data2 = BTreeMap::new();
        data2.insert("movement".to_string(), pos2);
        engine.record(Snapshot {
            match_id: MatchId(1),
            tick: 1,
            entity_order: entities,
            data: data2,
        });

        let d = engine.delta(MatchId(1), 0, 1).unwrap();
        assert!(d.added_entities.is_empty());
        assert!(d.removed_entities.is_empty());
        let movement = &d.changes["movement"];
        assert_eq!(movement["POSITION_X"], vec![(1, 5.0)]);
        assert_eq!(movement["POSITION_Y"], vec![(1, 5.0)]);
    }

    #[test]
    fn delta_reports_added_and_removed_entities() {
        let mut engine = SnapshotEngine::new(DEFAULT_HISTORY_CAPACITY);
        engine.record(Snapshot {
            match_id: MatchId(1),
            tick: 0,
            entity_order: vec![EntityId(1)],
            data: BTreeMap::new(),
        });
        engine.record(Snapshot {
            match_id: MatchId(1),
            tick: 1,
            entity_order: vec![EntityId(2)],
            data: BTreeMap::new(),
        });
        let d = engine.delta(MatchId(1), 0, 1).unwrap();
        assert_eq!(d.added_entities, vec![EntityId(2)]);
        assert_eq!(d.removed_entities, vec![EntityId(1)]);
    }

    #[test]
    fn engine_latest_tracks_the_most_recent_recorded_tick() {
        let mut engine = SnapshotEngine::new(DEFAULT_HISTORY_CAPACITY);
        assert!(engine.latest(MatchId(1)).is_none());
        engine.record(Snapshot { match_id: MatchId(1), tick: 0, entity_order: vec![], data: BTreeMap::new() });
        engine.record(Snapshot { match_id: MatchId(1), tick: 1, entity_order: vec![], data: BTreeMap::new() });
        assert_eq!(engine.latest(MatchId(1)).unwrap().tick, 1);
    }

    #[test]
    fn delta_on_missing_tick_is_not_found() {
        let engine = SnapshotEngine::new(DEFAULT_HISTORY_CAPACITY);
        let err = engine.delta(MatchId(1), 0, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
