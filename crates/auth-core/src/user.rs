//! User accounts.

use std::time::SystemTime;

use rustc_hash::{FxHashMap, FxHashSet};
use sim_ecs::error::PlatformError;
use uuid::Uuid;

/// A platform account.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique id.
    pub id: Uuid,
    /// Unique login name.
    pub username: String,
    /// Bcrypt password hash; never the plaintext.
    pub password_hash: String,
    /// Roles this user has been granted.
    pub role_ids: FxHashSet<Uuid>,
    /// Scopes granted directly to this user, outside any role.
    pub direct_scopes: FxHashSet<String>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Disabled accounts fail login with `USER_DISABLED`.
    pub enabled: bool,
}

impl User {
    /// Create a new, enabled user with no roles or direct scopes.
    #[must_use]
    pub fn new(id: Uuid, username: impl Into<String>, password_hash: impl Into<String>, now: SystemTime) -> Self {
        Self {
            id,
            username: username.into(),
            password_hash: password_hash.into(),
            role_ids: FxHashSet::default(),
            direct_scopes: FxHashSet::default(),
            created_at: now,
            enabled: true,
        }
    }
}

/// In-memory user storage, keyed by id and by unique username.
#[derive(Debug, Default)]
pub struct UserStore {
    by_id: FxHashMap<Uuid, User>,
    by_username: FxHashMap<String, Uuid>,
}

impl UserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new user, rejecting a duplicate username.
    pub fn create(&mut self, user: User) -> Result<Uuid, PlatformError> {
        if self.by_username.contains_key(&user.username) {
            return Err(PlatformError::conflict(format!("username '{}' already exists", user.username)));
        }
        let id = user.id;
        self.by_username.insert(user.username.clone(), id);
        self.by_id.insert(id, user);
        Ok(id)
    }

    /// Look up a user by id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&User> {
        self.by_id.get(&id)
    }

    /// Look up a user by username.
    #[must_use]
    pub fn get_by_username(&self, username: &str) -> Option<&User> {
        self.by_username.get(username).and_then(|id| self.by_id.get(id))
    }

    /// Mutable access to a user by id, for enable/disable and role grants.
    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.by_id.get_mut(&id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn create_then_lookup_by_id_and_username() {
        let mut store = UserStore::new();
        let id = Uuid::new_v4();
        store.create(User::new(id, "alice", "hash", SystemTime::now())).unwrap();
        assert_eq!(store.get(id).unwrap().username, "alice");
        assert_eq!(store.get_by_username("alice").unwrap().id, id);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let mut store = UserStore::new();
        store.create(User::new(Uuid::new_v4(), "alice", "h1", SystemTime::now())).unwrap();
        let err = store
            .create(User::new(Uuid::new_v4(), "alice", "h2", SystemTime::now()))
            .unwrap_err();
        assert_eq!(err.kind, sim_ecs::error::ErrorKind::Conflict);
    }
}
