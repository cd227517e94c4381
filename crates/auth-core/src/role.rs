//! Roles with transitive inclusion and cycle-safe updates.

use rustc_hash::{FxHashMap, FxHashSet};
use sim_ecs::error::PlatformError;
use uuid::Uuid;

/// A named, composable permission bundle.
#[derive(Debug, Clone)]
pub struct Role {
    /// Unique id.
    pub id: Uuid,
    /// Unique, human-readable name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Roles this role includes directly (one hop; `includes` closes transitively).
    pub included_role_ids: FxHashSet<Uuid>,
    /// Scopes granted directly by this role (before inclusion expansion).
    pub scopes: FxHashSet<String>,
}

impl Role {
    /// Create a role with no inclusions or scopes yet.
    #[must_use]
    pub fn new(id: Uuid, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            included_role_ids: FxHashSet::default(),
            scopes: FxHashSet::default(),
        }
    }
}

/// In-memory role storage, keyed by id and by unique name.
#[derive(Debug, Default)]
pub struct RoleStore {
    by_id: FxHashMap<Uuid, Role>,
    by_name: FxHashMap<String, Uuid>,
}

impl RoleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new role, rejecting a duplicate name.
    pub fn create(&mut self, role: Role) -> Result<Uuid, PlatformError> {
        if self.by_name.contains_key(&role.name) {
            return Err(PlatformError::conflict(format!("role '{}' already exists", role.name)));
        }
        let id = role.id;
        self.by_name.insert(role.name.clone(), id);
        self.by_id.insert(id, role);
        Ok(id)
    }

    /// Look up a role by id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Role> {
        self.by_id.get(&id)
    }

    /// Look up a role id by its unique name.
    #[must_use]
    pub fn get_id_by_name(&self, name: &str) -> Option<Uuid> {
        self.by_name.get(name).copied()
    }

    /// Replace `role_id`'s direct inclusions, refusing an update that would
    /// introduce a cycle.
    pub fn set_included_roles(
        &mut self,
        role_id: Uuid,
        new_included: FxHashSet<Uuid>,
    ) -> Result<(), PlatformError> {
        if !self.by_id.contains_key(&role_id) {
            return Err(PlatformError::not_found(format!("role {role_id} does not exist")));
        }
        for &candidate in &new_included {
            if candidate == role_id || self.includes(candidate, role_id) {
                return Err(PlatformError::validation(format!(
                    "including role {candidate} from {role_id} would create a cycle"
                )));
            }
        }
        if let Some(role) = self.by_id.get_mut(&role_id) {
            role.included_role_ids = new_included;
        }
        Ok(())
    }

    /// True if `role` includes `other`, reflexively and transitively
    /// (depth-first search over `included_role_ids`).
    #[must_use]
    pub fn includes(&self, role: Uuid, other: Uuid) -> bool {
        if role == other {
            return true;
        }
        let mut stack = vec![role];
        let mut visited = FxHashSet::default();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(r) = self.by_id.get(&current) else {
                continue;
            };
            if r.included_role_ids.contains(&other) {
                return true;
            }
            stack.extend(r.included_role_ids.iter().copied());
        }
        false
    }

    /// The transitive closure of scopes granted by `role` (its own scopes
    /// plus every included role's scopes).
    #[must_use]
    pub fn effective_scopes(&self, role: Uuid) -> FxHashSet<String> {
        let mut scopes = FxHashSet::default();
        let mut stack = vec![role];
        let mut visited = FxHashSet::default();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(r) = self.by_id.get(&current) else {
                continue;
            };
            scopes.extend(r.scopes.iter().cloned());
            stack.extend(r.included_role_ids.iter().copied());
        }
        scopes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sim_ecs::error::ErrorKind;

    fn role(name: &str) -> (Uuid, Role) {
        let id = Uuid::new_v4();
        (id, Role::new(id, name, ""))
    }

    #[test]
    fn inclusion_is_reflexive() {
        let mut store = RoleStore::new();
        let (a, role_a) = role("a");
        store.create(role_a).unwrap();
        assert!(store.includes(a, a));
    }

    #[test]
    fn inclusion_is_transitive() {
        let mut store = RoleStore::new();
        let (a, role_a) = role("a");
        let (b, role_b) = role("b");
        let (c, role_c) = role("c");
        store.create(role_a).unwrap();
        store.create(role_b).unwrap();
        store.create(role_c).unwrap();
        store.set_included_roles(b, [c].into_iter().collect()).unwrap();
        store.set_included_roles(a, [b].into_iter().collect()).unwrap();
        assert!(store.includes(a, c));
    }

    #[test]
    fn update_that_would_create_a_cycle_is_rejected() {
        let mut store = RoleStore::new();
        let (a, role_a) = role("a");
        let (b, role_b) = role("b");
        store.create(role_a).unwrap();
        store.create(role_b).unwrap();
        store.set_included_roles(a, [b].into_iter().collect()).unwrap();
        let err = store.set_included_roles(b, [a].into_iter().collect()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn effective_scopes_include_transitively_included_roles() {
        let mut store = RoleStore::new();
        let (a, mut role_a) = role("a");
        let (b, mut role_b) = role("b");
        role_a.scopes.insert("user.read".to_string());
        role_b.scopes.insert("user.write".to_string());
        store.create(role_a).unwrap();
        store.create(role_b).unwrap();
        store.set_included_roles(a, [b].into_iter().collect()).unwrap();
        let scopes = store.effective_scopes(a);
        assert!(scopes.contains("user.read"));
        assert!(scopes.contains("user.write"));
    }
}
