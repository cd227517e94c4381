//! The component store: `(entity, component) -> f32`, with presence-set
//! backed filtering.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::component::ComponentId;
use crate::entity::EntityId;

/// Operational counters for the store, useful for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Distinct entities with at least one attached component.
    pub entity_count: usize,
    /// Distinct components that have ever been attached.
    pub component_count: usize,
    /// Total number of live `(entity, component)` attachments.
    pub attachment_count: usize,
}

/// `(entity, component) -> f32` map with set-based presence lookup.
///
/// Invariants:
/// - `get` never fails; absence reads as `0.0`, indistinguishable from a
///   stored zero.
/// - `remove` is idempotent.
/// - `entities_with_all` returns exactly the intersection of the per-component
///   presence sets.
#[derive(Debug, Default)]
pub struct ComponentStore {
    values: FxHashMap<(EntityId, ComponentId), f32>,
    presence: FxHashMap<ComponentId, FxHashSet<EntityId>>,
    entities: FxHashSet<EntityId>,
}

impl ComponentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `value` for `(entity, component)`, overwriting any prior value.
    pub fn attach(&mut self, entity: EntityId, component: ComponentId, value: f32) {
        self.values.insert((entity, component), value);
        self.presence.entry(component).or_default().insert(entity);
        self.entities.insert(entity);
    }

    /// Attach several `(component, value)` pairs to one entity in one call.
    ///
    /// `components` and `values` must be the same length; excess entries in
    /// either are ignored, the same lenient-truncation tolerance used
    /// elsewhere in this data model for unrecognized input.
    pub fn attach_many(&mut self, entity: EntityId, components: &[ComponentId], values: &[f32]) {
        for (component, value) in components.iter().zip(values.iter()) {
            self.attach(entity, *component, *value);
        }
    }

    /// Remove the `(entity, component)` attachment, if any. Idempotent.
    pub fn remove(&mut self, entity: EntityId, component: ComponentId) {
        self.values.remove(&(entity, component));
        if let Some(set) = self.presence.get_mut(&component) {
            set.remove(&entity);
        }
        if !self.entity_has_any_component(entity) {
            self.entities.remove(&entity);
        }
    }

    /// Remove every component attached to `entity` in one sweep, used by the
    /// container's per-tick cleanup pass.
    pub fn destroy_entity(&mut self, entity: EntityId) {
        let components: Vec<ComponentId> = self
            .presence
            .iter()
            .filter(|(_, set)| set.contains(&entity))
            .map(|(c, _)| *c)
            .collect();
        for component in components {
            self.remove(entity, component);
        }
        self.entities.remove(&entity);
    }

    /// Read the value for `(entity, component)`. Absence reads as `0.0`.
    #[must_use]
    pub fn get(&self, entity: EntityId, component: ComponentId) -> f32 {
        self.values.get(&(entity, component)).copied().unwrap_or(0.0)
    }

    /// True if `component` has been attached to `entity` and not removed.
    #[must_use]
    pub fn exists(&self, entity: EntityId, component: ComponentId) -> bool {
        self.presence
            .get(&component)
            .is_some_and(|set| set.contains(&entity))
    }

    /// The intersection of the presence sets of every component in `components`.
    ///
    /// Returns an empty set if `components` is empty, matching the identity
    /// element of set intersection (and avoiding an accidental "matches
    /// everything" reading of an empty filter).
    #[must_use]
    pub fn entities_with_all(&self, components: &[ComponentId]) -> FxHashSet<EntityId> {
        let Some((first, rest)) = components.split_first() else {
            return FxHashSet::default();
        };
        let mut result = self
            .presence
            .get(first)
            .cloned()
            .unwrap_or_default();
        for component in rest {
            let Some(set) = self.presence.get(component) else {
                return FxHashSet::default();
            };
            result.retain(|e| set.contains(e));
            if result.is_empty() {
                break;
            }
        }
        result
    }

    /// All entities that have ever had a component attached and not fully
    /// cleared, in ascending id order.
    #[must_use]
    pub fn entities_ascending(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Operational counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entity_count: self.entities.len(),
            component_count: self.presence.len(),
            attachment_count: self.values.len(),
        }
    }

    fn entity_has_any_component(&self, entity: EntityId) -> bool {
        self.presence.values().any(|set| set.contains(&entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eid(n: u64) -> EntityId {
        EntityId(n)
    }
    fn cid(n: u64) -> ComponentId {
        ComponentId(n)
    }

    #[test]
    fn attach_then_get_and_exists_round_trip() {
        let mut store = ComponentStore::new();
        store.attach(eid(1), cid(1), 3.5);
        assert!((store.get(eid(1), cid(1)) - 3.5).abs() < f32::EPSILON);
        assert!(store.exists(eid(1), cid(1)));
    }

    #[test]
    fn remove_clears_value_and_presence_and_is_idempotent() {
        let mut store = ComponentStore::new();
        store.attach(eid(1), cid(1), 3.5);
        store.remove(eid(1), cid(1));
        assert!((store.get(eid(1), cid(1)) - 0.0).abs() < f32::EPSILON);
        assert!(!store.exists(eid(1), cid(1)));
        // idempotent: removing again is not an error and changes nothing further
        store.remove(eid(1), cid(1));
        assert!(!store.exists(eid(1), cid(1)));
    }

    #[test]
    fn absence_reads_as_zero_indistinguishable_from_stored_zero() {
        let mut store = ComponentStore::new();
        store.attach(eid(2), cid(1), 0.0);
        assert!((store.get(eid(2), cid(1)) - 0.0).abs() < f32::EPSILON);
        assert!((store.get(eid(99), cid(1)) - 0.0).abs() < f32::EPSILON);
        // both read 0.0, but only the first actually `exists`
        assert!(store.exists(eid(2), cid(1)));
        assert!(!store.exists(eid(99), cid(1)));
    }

    #[test]
    fn entities_with_all_is_set_intersection() {
        let mut store = ComponentStore::new();
        store.attach(eid(1), cid(1), 1.0);
        store.attach(eid(1), cid(2), 1.0);
        store.attach(eid(2), cid(1), 1.0);
        store.attach(eid(3), cid(2), 1.0);

        let both = store.entities_with_all(&[cid(1), cid(2)]);
        assert_eq!(both.len(), 1);
        assert!(both.contains(&eid(1)));

        let just_one = store.entities_with_all(&[cid(1)]);
        assert_eq!(just_one.len(), 2);
    }

    #[test]
    fn overwriting_an_attachment_replaces_the_value() {
        let mut store = ComponentStore::new();
        store.attach(eid(1), cid(1), 1.0);
        store.attach(eid(1), cid(1), 2.0);
        assert!((store.get(eid(1), cid(1)) - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn entities_ascending_is_sorted_by_numeric_id() {
        let mut store = ComponentStore::new();
        store.attach(eid(5), cid(1), 1.0);
        store.attach(eid(1), cid(1), 1.0);
        store.attach(eid(3), cid(1), 1.0);
        assert_eq!(store.entities_ascending(), vec![eid(1), eid(3), eid(5)]);
    }

    #[test]
    fn destroy_entity_sweeps_every_component() {
        let mut store = ComponentStore::new();
        store.attach(eid(1), cid(1), 1.0);
        store.attach(eid(1), cid(2), 2.0);
        store.destroy_entity(eid(1));
        assert!(!store.exists(eid(1), cid(1)));
        assert!(!store.exists(eid(1), cid(2)));
        assert_eq!(store.stats().entity_count, 0);
    }

    proptest::proptest! {
        #[test]
        fn intersection_matches_brute_force(
            attachments in proptest::collection::vec((0u64..8, 0u64..4), 0..64)
        ) {
            let mut store = ComponentStore::new();
            for (e, c) in &attachments {
                store.attach(eid(*e), cid(*c), 1.0);
            }
            for probe in [vec![cid(0)], vec![cid(0), cid(1)], vec![cid(0), cid(1), cid(2)]] {
                let via_store = store.entities_with_all(&probe);
                let brute: FxHashSet<EntityId> = (0u64..8)
                    .map(eid)
                    .filter(|e| probe.iter().all(|c| store.exists(*e, *c)))
                    .collect();
                assert_eq!(via_store, brute);
            }
        }
    }
}
